//! Table and column naming rules.

use super::entity::EntityIdent;

/// Column name prefixes used by auto-created join tables.
const JOIN_PREFIXES: [&str; 3] = ["", "from_", "to_"];

/// Table name derived from namespace and entity name.
pub fn default_table_name(namespace: &str, name: &str) -> String {
    format!("{}_{}", namespace, name).to_lowercase()
}

/// Join table name for a many-to-many field on a table.
pub fn join_table_name(owner_table: &str, field_name: &str) -> String {
    format!("{}_{}", owner_table, field_name.to_lowercase())
}

/// Owner-side and target-side column names of a join table.
///
/// Self-referential relations use `from_`/`to_` prefixes.
pub fn join_columns(owner: &EntityIdent, target: &EntityIdent) -> (String, String) {
    let owner_base = owner.base_name();
    let target_base = target.base_name();
    if owner.refers_to(target) {
        (
            format!("from_{}_id", owner_base),
            format!("to_{}_id", target_base),
        )
    } else {
        (format!("{}_id", owner_base), format!("{}_id", target_base))
    }
}

/// Rename a join column derived from `from_base` to the one derived from `to_base`.
///
/// Returns `None` if `column` was not derived from `from_base`.
pub fn rename_join_column(column: &str, from_base: &str, to_base: &str) -> Option<String> {
    JOIN_PREFIXES.iter().find_map(|prefix| {
        (column == format!("{}{}_id", prefix, from_base))
            .then(|| format!("{}{}_id", prefix, to_base))
    })
}

/// Field name for a foreign key column (`user_id` -> `user`).
pub fn strip_id_suffix(column: &str) -> String {
    column.strip_suffix("_id").unwrap_or(column).to_string()
}
