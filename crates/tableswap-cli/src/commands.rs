//! Command implementations.

use crate::error::CliError;
use crate::formatter::{self, OutputFormat};
use crate::script::{Script, ScriptWriter};
use std::fs;
use std::path::{Path, PathBuf};
use tableswap_core::catalog::{Catalog, CatalogStore, EntityIdent};
use tableswap_core::{
    Direction, ExecutorConfig, PlanBuilder, PlanExecutor, PlanScope, SqliteStore,
    TypeRegistryConfig,
};
use tracing::info;

/// Namespace and name of the platform's built-in principal entity.
pub const BUILTIN_PRINCIPAL: (&str, &str) = ("auth", "User");

/// Shared locations used by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Catalog database directory.
    pub catalog_path: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Script output root.
    pub scripts_path: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}

impl Context {
    fn open_catalog(&self) -> Result<CatalogStore, CliError> {
        Ok(CatalogStore::open_path(&self.catalog_path)?)
    }

    fn open_populated_catalog(&self) -> Result<CatalogStore, CliError> {
        let catalog = self.open_catalog()?;
        if catalog.current_version() == 0 {
            return Err(CliError::Usage(format!(
                "catalog at {} is empty; run `tableswap catalog import` first",
                self.catalog_path.display()
            )));
        }
        Ok(catalog)
    }
}

/// Options for `apply`.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Run the backward operations.
    pub backward: bool,
    /// Copy batch size.
    pub batch_size: usize,
    /// Log operations without executing them.
    pub dry_run: bool,
    /// Type registry table.
    pub registry_table: String,
    /// Type registry namespace and name columns.
    pub registry_columns: (String, String),
}

/// Import a schema bundle from a JSON file as the new catalog version.
pub fn catalog_import(ctx: &Context, file: &Path) -> Result<String, CliError> {
    let json = fs::read_to_string(file)?;
    let catalog = ctx.open_catalog()?;
    let version = catalog.import_json(&json)?;
    catalog.flush()?;

    let entities = catalog.entities()?.len();
    Ok(format!(
        "Imported {} entities as catalog version {}",
        entities, version
    ))
}

/// Show the current catalog version.
pub fn catalog_show(ctx: &Context) -> Result<String, CliError> {
    let catalog = ctx.open_catalog()?;
    match catalog.current_schema() {
        Some(schema) => formatter::format_schema(&schema, ctx.format),
        None => Ok("Catalog is empty".to_string()),
    }
}

/// Build a plan and render it.
pub fn plan(
    ctx: &Context,
    source: &EntityIdent,
    destination: &EntityIdent,
    scope: PlanScope,
) -> Result<String, CliError> {
    let catalog = ctx.open_populated_catalog()?;
    let plan = PlanBuilder::new(&catalog).build(source, destination, scope)?;
    formatter::format_plan(&plan, ctx.format)
}

/// Build a plan and write it as the next script of `namespace`.
fn create_script(
    ctx: &Context,
    source: &EntityIdent,
    destination: &EntityIdent,
    scope: PlanScope,
    namespace: &str,
    label: &str,
) -> Result<String, CliError> {
    let catalog = ctx.open_populated_catalog()?;
    let plan = PlanBuilder::new(&catalog).build(source, destination, scope)?;

    // Retargeting needs every related namespace's own scripts applied first.
    let related = match scope {
        PlanScope::ForeignKeys | PlanScope::Full => plan.related_namespaces.clone(),
        _ => Vec::new(),
    };

    let writer = ScriptWriter::new(&ctx.scripts_path);
    let (path, script) = writer.write(namespace, label, plan, &related)?;
    Ok(format!(
        "Created {} ({} forward operations, {} dependencies)",
        path.display(),
        script.plan.forward.len(),
        script.dependencies.len()
    ))
}

/// Write a script copying `source` rows into `destination`.
pub fn create_populate(
    ctx: &Context,
    source: &EntityIdent,
    destination: &EntityIdent,
) -> Result<String, CliError> {
    let label = format!("populate_{}", destination.base_name());
    create_script(
        ctx,
        source,
        destination,
        PlanScope::Populate,
        &destination.namespace,
        &label,
    )
}

/// Write a script retargeting foreign keys from `source` to `destination`.
pub fn create_schema(
    ctx: &Context,
    source: &EntityIdent,
    destination: &EntityIdent,
) -> Result<String, CliError> {
    let label = format!("retarget_{}", destination.base_name());
    create_script(
        ctx,
        source,
        destination,
        PlanScope::ForeignKeys,
        &destination.namespace,
        &label,
    )
}

/// Write a script renaming the type tag of `source` to `destination`.
pub fn create_type_tags(
    ctx: &Context,
    source: &EntityIdent,
    destination: &EntityIdent,
) -> Result<String, CliError> {
    let label = format!("type_tags_{}", destination.base_name());
    create_script(
        ctx,
        source,
        destination,
        PlanScope::TypeTags,
        &destination.namespace,
        &label,
    )
}

/// Write a script emptying the built-in principal's tables.
///
/// Backward refills them from `replacement`.
pub fn create_empty(ctx: &Context, replacement: &EntityIdent) -> Result<String, CliError> {
    let principal = EntityIdent::new(BUILTIN_PRINCIPAL.0, BUILTIN_PRINCIPAL.1);
    let label = format!("empty_{}", principal.base_name());
    create_script(
        ctx,
        replacement,
        &principal,
        PlanScope::Depopulate,
        &replacement.namespace,
        &label,
    )
}

/// Execute one direction of a script against the database.
pub fn apply(ctx: &Context, script_path: &Path, options: &ApplyOptions) -> Result<String, CliError> {
    let script = Script::load(script_path)?;
    let catalog = ctx.open_populated_catalog()?;
    let store = SqliteStore::open(&ctx.database_path)?;

    let registry = TypeRegistryConfig::default()
        .with_table(options.registry_table.clone())
        .with_columns(
            options.registry_columns.0.clone(),
            options.registry_columns.1.clone(),
        );
    let config = ExecutorConfig::default()
        .with_batch_size(options.batch_size)
        .with_registry(registry)
        .with_dry_run(options.dry_run);

    let direction = if options.backward {
        Direction::Backward
    } else {
        Direction::Forward
    };

    info!(
        script = %script.name,
        namespace = %script.namespace,
        database = %ctx.database_path.display(),
        %direction,
        "applying script"
    );
    let executor = PlanExecutor::new(&store, &catalog, config)?;
    let report = executor.execute(&script.plan, direction)?;
    formatter::format_report(&report, ctx.format)
}
