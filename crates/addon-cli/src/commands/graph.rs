//! Graph command implementation

use addon_packages::DependencyGraph;
use colored::Colorize;
use serde::Serialize;

use super::print_json;
use crate::context::Context;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct GraphEntry<'a> {
    name: &'a str,
    depends: Vec<&'a str>,
}

/// Run the graph command: every known package in load order, with its
/// direct dependencies.
pub fn run_graph(ctx: &Context) -> Result<()> {
    let loader = ctx.open_loader()?;
    let order = loader.load_order()?;
    let graph = DependencyGraph::from_packages(loader.packages());
    let entries: Vec<GraphEntry<'_>> = order
        .iter()
        .map(|name| GraphEntry {
            name,
            depends: graph.dependencies_of(name),
        })
        .collect();

    if ctx.json {
        return print_json(&entries);
    }

    println!("{}", "Load order".bold());
    for (index, entry) in entries.iter().enumerate() {
        if entry.depends.is_empty() {
            println!("  {:>3}. {}", index + 1, entry.name.cyan());
        } else {
            println!(
                "  {:>3}. {} {} {}",
                index + 1,
                entry.name.cyan(),
                "<-".dimmed(),
                entry.depends.join(", ")
            );
        }
    }
    Ok(())
}
