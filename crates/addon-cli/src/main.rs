//! Addon loader CLI
//!
//! The command-line interface for installing, upgrading and inspecting
//! addon packages. Exit codes follow the failure kind: 1 validation or
//! composition, 2 topology, 3 schema or data, 4 hook.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use context::Context;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("{} addon loader", "addon".green().bold());
        println!();
        println!("Run {} for available commands.", "addon --help".cyan());
        return Ok(());
    };

    let cwd = std::env::current_dir()?;
    let ctx = Context::resolve(&cwd, &cli.global)?;
    context::init_tracing(&ctx.config.log, cli.global.verbose);
    tracing::debug!(config = ?ctx.config, "configuration resolved");

    execute_command(&ctx, command)
}

fn execute_command(ctx: &Context, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::List { all } => commands::run_list(ctx, all),
        Commands::Install { names } => commands::run_install(ctx, &names),
        Commands::Upgrade { names, all } => commands::run_upgrade(ctx, &names, all),
        Commands::Uninstall { names, drop } => commands::run_uninstall(ctx, &names, drop),
        Commands::Verify { names } => commands::run_verify(ctx, &names),
        Commands::Graph => commands::run_graph(ctx),
        Commands::Show { model } => commands::run_show(ctx, &model),
    }
}
