//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Addon loader - install, upgrade and inspect ERP addon packages
#[derive(Parser, Debug)]
#[command(name = "addon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags accepted by every command. They override the config files and
/// the `ADDON_*` environment variables.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Directory searched for packages (repeatable, earlier wins)
    #[arg(long = "addons-path", value_name = "DIR", global = true)]
    pub addons_path: Vec<PathBuf>,

    /// Database URL: `memory:`, `file://<path>` or a plain path
    #[arg(long, value_name = "URL", global = true)]
    pub database: Option<String>,

    /// Load demo data
    #[arg(long, global = true)]
    pub demo: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List installed packages
    List {
        /// Include packages that are not installed
        #[arg(long)]
        all: bool,
    },

    /// Install packages with their dependencies
    ///
    /// Examples:
    ///   addon install sale          # Install sale and what it depends on
    ///   addon install sale --demo   # Also load demo data
    Install {
        /// Packages to install
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Upgrade installed packages
    ///
    /// Without names, upgrades every package whose manifest version
    /// differs from the installed one.
    Upgrade {
        /// Packages to upgrade
        names: Vec<String>,

        /// Upgrade every installed package
        #[arg(long)]
        all: bool,
    },

    /// Uninstall packages and everything that depends on them
    Uninstall {
        /// Packages to uninstall
        #[arg(required = true)]
        names: Vec<String>,

        /// Drop the tables and columns the packages added
        #[arg(long)]
        drop: bool,
    },

    /// Preview the schema changes of the installed set, without applying them
    Verify {
        /// Packages to include as if they were installed
        names: Vec<String>,
    },

    /// Print the load order of every known package
    Graph,

    /// Show a composed model of the installed registry
    Show {
        /// Model name, e.g. `res.partner`
        model: String,
    },
}
