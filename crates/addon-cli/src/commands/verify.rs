//! Verify command implementation
//!
//! Builds the registry of the installed set plus `names` and prints the
//! schema changes a load would make, without touching the store.

use colored::Colorize;

use super::print_json;
use crate::context::Context;
use crate::error::Result;

/// Run the verify command
pub fn run_verify(ctx: &Context, names: &[String]) -> Result<()> {
    let loader = ctx.open_loader()?;
    let report = loader.verify(names)?;

    if ctx.json {
        return print_json(&report);
    }

    println!(
        "{} {} package(s), {} model(s)",
        "Registry".bold(),
        report.load_order.len(),
        report.models
    );
    println!("{}: {}", "Fingerprint".dimmed(), report.fingerprint);
    println!("{}: {}", "Load order".dimmed(), report.load_order.join(", "));

    if !report.to_install.is_empty() {
        println!();
        println!("{}:", "Would install".bold());
        for name in &report.to_install {
            println!("  {} {}", "+".green(), name.cyan());
        }
    }

    if !report.statements.is_empty() {
        println!();
        println!("{}:", "Pending schema changes".bold());
        for statement in &report.statements {
            println!("  {}", statement);
        }
    }

    if !report.orphans.is_empty() {
        println!();
        println!("{}:", "Orphaned (kept until dropped)".bold());
        for orphan in &report.orphans {
            println!("  {} {}", "~".yellow(), orphan);
        }
    }

    if report.is_clean() {
        println!();
        println!("{} Schema is in sync.", "OK".green().bold());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use addon_core::LoaderConfig;
    use addon_test_utils::TestAddons;

    #[test]
    fn verify_does_not_create_the_database() {
        let addons = TestAddons::new();
        addons.package("a", &[]);
        let ctx = Context {
            config: LoaderConfig {
                addons_path: vec![addons.addons_path()],
                database_url: addons.database_url(),
                ..LoaderConfig::default()
            },
            json: false,
        };
        run_verify(&ctx, &["a".to_string()]).unwrap();
        assert!(!addons.database_path().exists());
    }
}
