//! DDL generation, schema lock snapshots, additive diffs and migration bookkeeping.

mod diff;
mod lock;
mod migrations;

use std::collections::HashSet;
use std::sync::Arc;

use crate::codec;
use crate::database::D1Database;
use crate::error::OrmError;
use crate::model::{Field, FieldDefault, ModelSchema};
use crate::types::SqlValue;

pub use diff::SchemaDiff;
pub use lock::{ColumnSnapshot, SchemaLock, TableSnapshot};
pub use migrations::{AppliedMigration, Migration, MigrationTracker};

/// Options for [`SchemaManager::generate_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Emit `CREATE INDEX` for fields declared with `index`.
    pub include_indexes: bool,
    /// Prefix every table with `DROP TABLE IF EXISTS`.
    pub cleanslate: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            include_indexes: true,
            cleanslate: false,
        }
    }
}

/// Outcome of creating one model's table in [`SchemaManager::migrate_all`].
#[derive(Debug)]
pub struct TableOutcome {
    pub model: String,
    pub table: String,
    pub result: Result<(), OrmError>,
}

/// Stateless DDL helpers over model schemas.
pub struct SchemaManager;

impl SchemaManager {
    /// `CREATE TABLE IF NOT EXISTS` for one model, columns in declaration order.
    #[must_use]
    pub fn create_table_sql(schema: &ModelSchema) -> String {
        let columns = schema
            .fields()
            .iter()
            .map(|field| format!("    {}", column_definition(field)))
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{columns}\n);",
            schema.table_name()
        )
    }

    /// One `CREATE INDEX IF NOT EXISTS` per indexed field that is not already unique or a key.
    #[must_use]
    pub fn index_sql(schema: &ModelSchema) -> Vec<String> {
        schema
            .fields()
            .iter()
            .filter(|f| f.is_indexed() && !f.is_unique() && !f.is_primary_key())
            .map(|f| index_statement(schema.table_name(), f))
            .collect()
    }

    #[must_use]
    pub fn drop_table_sql(schema: &ModelSchema) -> String {
        format!("DROP TABLE IF EXISTS {};", schema.table_name())
    }

    /// Full schema for `models` with default options.
    #[must_use]
    pub fn generate_schema_sql(models: &[Arc<ModelSchema>]) -> String {
        Self::generate_schema(models, SchemaOptions::default())
    }

    /// Full schema for `models`. A table name claimed by an earlier model is
    /// skipped with a warning.
    #[must_use]
    pub fn generate_schema(models: &[Arc<ModelSchema>], options: SchemaOptions) -> String {
        let mut seen = HashSet::new();
        let mut blocks = Vec::with_capacity(models.len());
        for schema in models {
            if !seen.insert(schema.table_name()) {
                tracing::warn!(
                    model = schema.name(),
                    table = schema.table_name(),
                    "duplicate table name; skipping model"
                );
                continue;
            }
            let mut block = format!("-- Table for {}\n", schema.name());
            if options.cleanslate {
                block.push_str(&Self::drop_table_sql(schema));
                block.push('\n');
            }
            block.push_str(&Self::create_table_sql(schema));
            if options.include_indexes {
                for index in Self::index_sql(schema) {
                    block.push('\n');
                    block.push_str(&index);
                }
            }
            blocks.push(block);
        }
        blocks.join("\n\n")
    }

    /// Additive diff from `lock` to the current `models`.
    #[must_use]
    pub fn diff(models: &[Arc<ModelSchema>], lock: &SchemaLock) -> SchemaDiff {
        diff::diff(models, lock)
    }

    /// The diff's executable statements as one script.
    #[must_use]
    pub fn diff_sql(models: &[Arc<ModelSchema>], lock: &SchemaLock) -> String {
        Self::diff(models, lock).to_sql()
    }

    /// Create every model's table (and indexes), continuing past failures.
    pub async fn migrate_all<D: D1Database + ?Sized>(
        db: &D,
        models: &[Arc<ModelSchema>],
    ) -> Vec<TableOutcome> {
        let mut outcomes = Vec::with_capacity(models.len());
        for schema in models {
            let mut sql = Self::create_table_sql(schema);
            for index in Self::index_sql(schema) {
                sql.push('\n');
                sql.push_str(&index);
            }
            let result = db.exec(&sql).await.map(|_| ());
            if let Err(e) = &result {
                tracing::warn!(model = schema.name(), error = %e, "failed to create table");
            }
            outcomes.push(TableOutcome {
                model: schema.name().to_owned(),
                table: schema.table_name().to_owned(),
                result,
            });
        }
        outcomes
    }
}

/// Column clause used by both CREATE TABLE and ADD COLUMN.
pub(crate) fn column_definition(field: &Field) -> String {
    if field.is_primary_key() {
        return if field.is_auto_increment() {
            format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", field.name())
        } else {
            format!("{} {} PRIMARY KEY NOT NULL", field.name(), field.sql_type())
        };
    }
    let mut def = format!("{} {}", field.name(), field.sql_type());
    if !field.is_nullable() {
        def.push_str(" NOT NULL");
    }
    if field.is_unique() {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = default_clause(field) {
        def.push_str(" DEFAULT ");
        def.push_str(&default);
    }
    def
}

/// DDL default for a field: constant defaults as literals, `auto_now_add` as
/// the engine's current time. Factories run at construction and have none.
pub(crate) fn default_clause(field: &Field) -> Option<String> {
    if field.is_auto_now_add() {
        return Some("(CAST(strftime('%s','now') AS INTEGER))".to_owned());
    }
    match field.default_value()? {
        FieldDefault::Value(value) => match codec::encode_operand(field, value.clone()) {
            Ok(lowered) => Some(sql_literal(&lowered)),
            Err(e) => {
                tracing::warn!(field = field.name(), error = %e, "default does not fit field type; omitted from DDL");
                None
            }
        },
        FieldDefault::Factory(_) => None,
    }
}

pub(crate) fn index_statement(table: &str, field: &Field) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_{col} ON {table} ({col});",
        col = field.name()
    )
}

fn sql_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_owned(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Bool(b) => i64::from(*b).to_string(),
        SqlValue::Timestamp(ts) => ts.timestamp().to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        SqlValue::Json(v) => format!("'{}'", v.to_string().replace('\'', "''")),
        SqlValue::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
    }
}
