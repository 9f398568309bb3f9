//! Show command implementation
//!
//! Prints one composed model of the installed registry: its
//! contribution chain, effective fields, method chains and constraints.

use addon_model::{ComposedModel, Constraint, Field, FieldType, Storage};
use colored::Colorize;

use super::print_json;
use crate::context::Context;
use crate::error::{CliError, Result};

/// Run the show command
pub fn run_show(ctx: &Context, model: &str) -> Result<()> {
    let loader = ctx.open_loader()?;
    let registry = loader.boot()?;
    let Some(composed) = registry.get(model) else {
        return Err(CliError::user(format!(
            "model '{model}' is not defined by any installed package"
        )));
    };

    if ctx.json {
        return print_json(composed);
    }
    print_model(composed);
    Ok(())
}

fn print_model(model: &ComposedModel) {
    println!("{}", model.name.bold());
    if let Some(description) = &model.description {
        println!("  {}", description.dimmed());
    }
    match &model.table {
        Some(table) => println!("{}:      {}", "Table".dimmed(), table),
        None => println!("{}:      {}", "Table".dimmed(), "(abstract)".dimmed()),
    }
    println!("{}:      {}", "Order".dimmed(), model.order);
    if let Some(old) = &model.renamed_from {
        println!("{}: {}", "Renamed from".dimmed(), old);
    }

    println!();
    println!("{}:", "Contributions".bold());
    for entry in &model.mro {
        let mode = serde_json::to_value(entry.mode)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!("  {} {}", entry.package.cyan(), mode.dimmed());
    }

    println!();
    println!("{}:", "Fields".bold());
    let width = model.fields.keys().map(String::len).max().unwrap_or(0);
    for field in model.fields.values() {
        print_field(field, width);
    }

    if !model.delegates.is_empty() {
        println!();
        println!("{}:", "Delegates".bold());
        for (parent, field) in &model.delegates {
            println!("  {} via {}", parent.cyan(), field);
        }
    }

    if !model.methods.is_empty() {
        println!();
        println!("{}:", "Methods".bold());
        for (name, chain) in &model.methods {
            let chain: Vec<String> = chain
                .iter()
                .map(|m| format!("{}:{}", m.package, m.symbol))
                .collect();
            println!("  {} {}", name.cyan(), chain.join(" -> "));
        }
    }

    if !model.constraints.is_empty() {
        println!();
        println!("{}:", "Constraints".bold());
        for constraint in &model.constraints {
            match constraint {
                Constraint::Unique { name, fields } => {
                    println!("  {} unique({})", name.cyan(), fields.join(", "))
                }
                Constraint::Check {
                    name,
                    field,
                    min,
                    max,
                } => println!(
                    "  {} check({} in {}..{})",
                    name.cyan(),
                    field,
                    min.map(|v| v.to_string()).unwrap_or_default(),
                    max.map(|v| v.to_string()).unwrap_or_default()
                ),
            }
        }
    }
}

fn print_field(field: &Field, width: usize) {
    let mut flags = Vec::new();
    if field.required {
        flags.push("required".to_string());
    }
    if field.readonly {
        flags.push("readonly".to_string());
    }
    if field.translate {
        flags.push("translate".to_string());
    }
    if let Some(label) = storage_label(field.storage) {
        flags.push(label.to_string());
    }
    if let Some(parent) = &field.inherited_from {
        flags.push(format!("from {parent}"));
    }

    let mut origin = field.defined_by.clone();
    if !field.modified_by.is_empty() {
        origin.push_str(&format!(" +{}", field.modified_by.join(" +")));
    }

    println!(
        "  {:width$} {:24} {} {}",
        field.name,
        type_label(&field.ty),
        origin.dimmed(),
        flags.join(" ").yellow()
    );
}

fn type_label(ty: &FieldType) -> String {
    match ty {
        FieldType::Text { size: Some(size) } => format!("text({size})"),
        FieldType::Decimal { precision, scale } => format!("decimal({precision},{scale})"),
        FieldType::Many2one { comodel, .. }
        | FieldType::One2many { comodel, .. }
        | FieldType::Many2many { comodel, .. } => format!("{}({comodel})", ty.kind()),
        _ => ty.kind().to_string(),
    }
}

fn storage_label(storage: Storage) -> Option<&'static str> {
    match storage {
        Storage::Column => None,
        Storage::ComputedOnRead => Some("computed"),
        Storage::ComputedStored => Some("computed, stored"),
        Storage::RelationTable => Some("relation table"),
        Storage::Virtual => Some("virtual"),
    }
}
