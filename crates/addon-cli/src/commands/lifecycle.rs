//! Install, upgrade and uninstall commands
//!
//! All three print the run's [`LoadReport`] and turn a failed or
//! cancelled run into an error carrying the failure's kind.

use addon_core::{LoadReport, Operation};
use colored::Colorize;

use super::print_json;
use crate::context::Context;
use crate::error::{CliError, Result};

/// Run the install command
pub fn run_install(ctx: &Context, names: &[String]) -> Result<()> {
    let mut loader = ctx.open_loader()?;
    let report = loader.install(names)?;
    finish(ctx, &report)
}

/// Run the upgrade command
pub fn run_upgrade(ctx: &Context, names: &[String], all: bool) -> Result<()> {
    let mut loader = ctx.open_loader()?;
    let report = loader.upgrade(names, all)?;
    finish(ctx, &report)
}

/// Run the uninstall command
pub fn run_uninstall(ctx: &Context, names: &[String], drop: bool) -> Result<()> {
    let mut loader = ctx.open_loader()?;
    let report = loader.uninstall(names, drop)?;
    finish(ctx, &report)
}

fn finish(ctx: &Context, report: &LoadReport) -> Result<()> {
    if ctx.json {
        print_json(report)?;
    } else {
        print_report(report);
    }

    if let Some(failure) = &report.failure {
        return Err(CliError::Run {
            package: failure.package.clone(),
            kind: failure.kind,
            message: failure.message.clone(),
        });
    }
    if report.cancelled {
        return Err(addon_core::Error::Cancelled.into());
    }
    Ok(())
}

fn print_report(report: &LoadReport) {
    let (title, done, verb) = match report.operation {
        Operation::Install => ("Install", &report.installed, "installed"),
        Operation::Upgrade => ("Upgrade", &report.upgraded, "upgraded"),
        Operation::Uninstall => ("Uninstall", &report.removed, "removed"),
    };
    println!("{}", title.bold());

    if done.is_empty() && report.installed.is_empty() && report.is_success() {
        println!("  {} Nothing to do.", "OK".green().bold());
        return;
    }

    for name in done {
        let auto = if report.auto_installed.contains(name) {
            format!(" {}", "(auto)".dimmed())
        } else {
            String::new()
        };
        println!("  {} {} {}{}", "+".green(), name.cyan(), verb, auto);
    }
    // An upgrade installs dependencies it pulled in.
    if report.operation == Operation::Upgrade {
        for name in &report.installed {
            println!("  {} {} installed", "+".green(), name.cyan());
        }
    }
    for name in &report.skipped {
        println!("  {} {} skipped", "-".yellow(), name.cyan());
    }

    println!();
    println!(
        "{}: {} schema change(s); records {} created, {} updated, {} deleted; {} translation(s)",
        "Summary".dimmed(),
        report.schema_ops,
        report.data.created,
        report.data.updated,
        report.data.deleted,
        report.data.translated,
    );
    if let Some(fingerprint) = &report.fingerprint {
        println!("{}: {}", "Registry".dimmed(), fingerprint);
    }

    if !report.warnings.is_empty() {
        println!();
        for warning in &report.warnings {
            println!("  {} {}", "!".yellow(), warning);
        }
    }

    if let Some(failure) = &report.failure {
        println!();
        println!(
            "{} {} ({} error): {}",
            "FAILED".red().bold(),
            failure.package.cyan(),
            failure.kind,
            failure.message
        );
    } else if report.cancelled {
        println!();
        println!("{} the previous registry stays active", "CANCELLED".yellow().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addon_core::{ErrorKind, LoaderConfig, PackageFailure};
    use addon_test_utils::TestAddons;

    fn context(addons: &TestAddons) -> Context {
        Context {
            config: LoaderConfig {
                addons_path: vec![addons.addons_path()],
                database_url: addons.database_url(),
                ..LoaderConfig::default()
            },
            json: false,
        }
    }

    #[test]
    fn install_then_uninstall() {
        let addons = TestAddons::new();
        addons.package("a", &[]);
        let ctx = context(&addons);
        run_install(&ctx, &["a".to_string()]).unwrap();
        run_uninstall(&ctx, &["a".to_string()], false).unwrap();
    }

    #[test]
    fn unknown_package_is_a_validation_error() {
        let addons = TestAddons::new();
        let err = run_install(&context(&addons), &["missing".to_string()]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
    }

    #[test]
    fn failed_report_carries_its_kind() {
        let addons = TestAddons::new();
        let mut report = LoadReport::new(Operation::Install);
        report.failure = Some(PackageFailure {
            package: "b".into(),
            kind: ErrorKind::Data,
            message: "unresolved reference".into(),
        });
        let err = finish(&context(&addons), &report).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn cancelled_report_is_an_error() {
        let addons = TestAddons::new();
        let mut report = LoadReport::new(Operation::Upgrade);
        report.cancelled = true;
        assert!(finish(&context(&addons), &report).is_err());
    }
}
