use std::collections::HashSet;
use std::sync::Arc;

use crate::model::{Field, ModelSchema};

use super::lock::{ColumnSnapshot, SchemaLock, TableSnapshot};
use super::{SchemaManager, column_definition, index_statement};

/// Additive migration from a schema lock to the current models.
///
/// `statements` are safe to execute in order. `unsupported` describes changes
/// that need a hand-written migration and are never emitted as SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub statements: Vec<String>,
    pub unsupported: Vec<String>,
}

impl SchemaDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.unsupported.is_empty()
    }

    /// Executable statements joined one per line.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.statements.join("\n")
    }

    fn unsupported(&mut self, table: &str, message: String) {
        tracing::warn!(table, change = %message, "schema change needs a manual migration");
        self.unsupported.push(format!("{table}: {message}"));
    }
}

pub(super) fn diff(models: &[Arc<ModelSchema>], lock: &SchemaLock) -> SchemaDiff {
    let mut out = SchemaDiff::default();
    let mut seen = HashSet::new();
    for schema in models {
        if !seen.insert(schema.table_name()) {
            continue;
        }
        match lock.table(schema.table_name()) {
            None => {
                out.statements.push(SchemaManager::create_table_sql(schema));
                out.statements.extend(SchemaManager::index_sql(schema));
            }
            Some(before) => diff_table(schema, before, &mut out),
        }
    }
    for (table, snapshot) in &lock.tables {
        if !seen.contains(table.as_str()) {
            out.unsupported(
                table,
                format!("model {} was removed; table not dropped", snapshot.model),
            );
        }
    }
    out
}

fn diff_table(schema: &ModelSchema, before: &TableSnapshot, out: &mut SchemaDiff) {
    let table = schema.table_name();
    for field in schema.fields() {
        match before.column(field.name()) {
            None => add_column(table, field, out),
            Some(old) => compare_column(table, field, old, out),
        }
    }
    for old in &before.columns {
        if schema.field(&old.name).is_none() {
            out.unsupported(table, format!("column {} was removed", old.name));
        }
    }
}

fn add_column(table: &str, field: &Field, out: &mut SchemaDiff) {
    let name = field.name();
    if field.is_primary_key() {
        return out.unsupported(table, format!("cannot add primary key column {name}"));
    }
    if field.is_unique() {
        return out.unsupported(table, format!("cannot add UNIQUE column {name}"));
    }
    if field.is_auto_now_add() {
        return out.unsupported(table, format!("cannot add column {name} with a non-constant default"));
    }
    let snapshot = ColumnSnapshot::from(field);
    if !snapshot.nullable && snapshot.default.is_none() {
        return out.unsupported(table, format!("cannot add NOT NULL column {name} without a default"));
    }
    out.statements
        .push(format!("ALTER TABLE {table} ADD COLUMN {};", column_definition(field)));
    if field.is_indexed() {
        out.statements.push(index_statement(table, field));
    }
}

fn compare_column(table: &str, field: &Field, old: &ColumnSnapshot, out: &mut SchemaDiff) {
    let new = ColumnSnapshot::from(field);
    if new == *old {
        return;
    }
    let index_only = ColumnSnapshot {
        indexed: old.indexed,
        ..new.clone()
    } == *old;
    if index_only && new.indexed && !new.unique && !new.primary_key {
        out.statements.push(index_statement(table, field));
        return;
    }
    out.unsupported(
        table,
        format!(
            "column {} changed from {} to {}",
            new.name,
            describe(old),
            describe(&new)
        ),
    );
}

fn describe(column: &ColumnSnapshot) -> String {
    let mut text = column.sql_type.clone();
    if column.primary_key {
        text.push_str(" PRIMARY KEY");
    }
    if !column.nullable {
        text.push_str(" NOT NULL");
    }
    if column.unique {
        text.push_str(" UNIQUE");
    }
    if column.indexed {
        text.push_str(" INDEXED");
    }
    if let Some(default) = &column.default {
        text.push_str(" DEFAULT ");
        text.push_str(default);
    }
    text
}
