//! Output formatting for catalogs, plans and execution reports.

use crate::error::CliError;
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use tableswap_core::catalog::{FieldKind, SchemaBundle};
use tableswap_core::swap::Operation;
use tableswap_core::{ExecutionReport, MigrationPlan};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render the entities of a schema bundle.
pub fn format_schema(schema: &SchemaBundle, format: OutputFormat) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return Ok(schema.to_json()?);
    }

    let mut table = Table::new();
    table.set_header(vec!["Entity", "Table", "Primary key", "Columns", "Relations"]);

    for entity in &schema.entities {
        let relations: Vec<String> = entity
            .fields
            .iter()
            .filter_map(|f| match &f.kind {
                FieldKind::ForeignKey { target } => Some(format!("{} -> {}", f.name, target)),
                FieldKind::ManyToMany { target } => Some(format!("{} <-> {}", f.name, target)),
                FieldKind::Scalar => None,
            })
            .collect();

        table.add_row(vec![
            Cell::new(entity.ident()),
            Cell::new(entity.table_name()),
            Cell::new(&entity.primary_key),
            Cell::new(entity.columns().join(", ")),
            Cell::new(relations.join("\n")),
        ]);
    }

    Ok(format!(
        "Schema version {} ({} entities)\n{}",
        schema.version,
        schema.entities.len(),
        table
    ))
}

fn operation_detail(operation: &Operation) -> String {
    match operation {
        Operation::Copy { from, to, remap } => match remap {
            Some(remap) => format!(
                "{} -> {} ({}_id -> {}_id)",
                from, to, remap.from_base, remap.to_base
            ),
            None => format!("{} -> {}", from, to),
        },
        Operation::Empty { entity } => entity.to_string(),
        Operation::RewriteForeignKey { relation, from, to } => format!(
            "{}.{}: {} -> {}",
            relation.owning_table, relation.column, from, to
        ),
        Operation::RenameTypeTag { from, to } => format!("{} -> {}", from, to),
    }
}

/// Render a plan.
pub fn format_plan(plan: &MigrationPlan, format: OutputFormat) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return Ok(plan.to_json()?);
    }

    let mut table = Table::new();
    table.set_header(vec!["Direction", "#", "Kind", "Operation"]);

    for (direction, operations) in [("forward", &plan.forward), ("backward", &plan.backward)] {
        for (index, operation) in operations.iter().enumerate() {
            table.add_row(vec![
                Cell::new(direction),
                Cell::new(index),
                Cell::new(operation.kind()),
                Cell::new(operation_detail(operation)),
            ]);
        }
    }

    let mut output = format!(
        "{} -> {} ({})\n{}",
        plan.source, plan.destination, plan.scope, table
    );
    if !plan.related_namespaces.is_empty() {
        output.push_str(&format!(
            "\nRelated namespaces: {}",
            plan.related_namespaces.join(", ")
        ));
    }
    Ok(output)
}

/// Render an execution report.
pub fn format_report(report: &ExecutionReport, format: OutputFormat) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![Cell::new("direction"), Cell::new(report.direction)]);
    table.add_row(vec![
        Cell::new("operations"),
        Cell::new(format!(
            "{}/{}",
            report.operations_executed, report.total_operations
        )),
    ]);
    table.add_row(vec![Cell::new("rows copied"), Cell::new(report.rows_copied)]);
    table.add_row(vec![Cell::new("rows deleted"), Cell::new(report.rows_deleted)]);
    table.add_row(vec![
        Cell::new("foreign keys rewritten"),
        Cell::new(report.foreign_keys_rewritten),
    ]);
    table.add_row(vec![
        Cell::new("type tags renamed"),
        Cell::new(report.type_tags_renamed),
    ]);
    Ok(table.to_string())
}
