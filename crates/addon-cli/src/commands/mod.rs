//! Command implementations for addon-cli

pub mod graph;
pub mod lifecycle;
pub mod list;
pub mod show;
pub mod verify;

pub use graph::run_graph;
pub use lifecycle::{run_install, run_uninstall, run_upgrade};
pub use list::run_list;
pub use show::run_show;
pub use verify::run_verify;

use serde::Serialize;

use crate::error::Result;

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
