//! List command implementation

use addon_core::PackageStatus;
use addon_store::PackageState;
use colored::Colorize;

use super::print_json;
use crate::context::Context;
use crate::error::Result;

/// Run the list command
pub fn run_list(ctx: &Context, all: bool) -> Result<()> {
    let loader = ctx.open_loader()?;
    let statuses: Vec<PackageStatus> = loader
        .statuses()
        .into_iter()
        .filter(|s| all || s.state == PackageState::Installed)
        .collect();

    if ctx.json {
        return print_json(&statuses);
    }

    if statuses.is_empty() {
        if all {
            println!("{}", "No packages found on the addons path".dimmed());
        } else {
            println!(
                "{} (use {} to see available packages)",
                "No packages installed".dimmed(),
                "addon list --all".cyan()
            );
        }
        return Ok(());
    }

    println!("{}", "Packages".bold());
    let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for status in &statuses {
        print_status(status, width);
    }
    Ok(())
}

fn print_status(status: &PackageStatus, width: usize) {
    let marker = if status.state == PackageState::Installed {
        "+".green()
    } else {
        "-".dimmed()
    };
    let name = format!("{:width$}", status.name);
    let name = if status.application {
        name.cyan().bold()
    } else {
        name.cyan()
    };
    let mut line = format!("  {} {} {:8} {}", marker, name, status.version, status.state);
    if let Some(installed) = &status.installed_version
        && status.state == PackageState::Installed
        && *installed != status.version
    {
        line.push_str(&format!(
            " {}",
            format!("(upgrade from {installed} pending)").yellow()
        ));
    }
    if let Some(summary) = &status.summary {
        line.push_str(&format!("  {}", summary.dimmed()));
    }
    println!("{line}");
}
