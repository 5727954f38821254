use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::database::{BoundStatement, D1Database};
use crate::error::OrmError;
use crate::results::Row;
use crate::statement::split_statements;
use crate::types::SqlValue;

use super::diff::SchemaDiff;

const MIGRATIONS_TABLE: &str = "_d1_migrations";

static MIGRATION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("migration name pattern is valid"));

/// A named group of statements applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    name: String,
    statements: Vec<String>,
}

impl Migration {
    /// # Errors
    /// Returns `OrmError::Schema` for an invalid name or an empty statement list.
    pub fn new(name: impl Into<String>, statements: Vec<String>) -> Result<Self, OrmError> {
        let name = name.into();
        if !MIGRATION_NAME.is_match(&name) {
            return Err(OrmError::Schema(format!(
                "invalid migration name '{name}': use letters, digits, '_' or '-'"
            )));
        }
        if statements.iter().all(|s| s.trim().is_empty()) {
            return Err(OrmError::Schema(format!("migration '{name}' has no statements")));
        }
        Ok(Self { name, statements })
    }

    /// Migration carrying a diff's executable statements.
    ///
    /// # Errors
    /// Same as [`Migration::new`]; an empty diff has no statements.
    pub fn from_diff(name: impl Into<String>, diff: &SchemaDiff) -> Result<Self, OrmError> {
        Self::new(name, diff.statements.clone())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

/// A row of the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub id: i64,
    pub name: String,
    pub statements: Vec<String>,
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigration {
    fn from_row(row: &Row) -> Result<Self, OrmError> {
        let missing = |col: &str| OrmError::Schema(format!("{MIGRATIONS_TABLE} row has no usable {col}"));
        let id = row.get("id").and_then(SqlValue::as_int).ok_or_else(|| missing("id"))?;
        let name = row
            .get("name")
            .and_then(SqlValue::as_text)
            .ok_or_else(|| missing("name"))?
            .to_owned();
        let statements = row
            .get("statements")
            .and_then(SqlValue::as_text)
            .ok_or_else(|| missing("statements"))?;
        let applied_at = row
            .get("applied_at")
            .and_then(SqlValue::as_int)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| missing("applied_at"))?;
        Ok(Self {
            id,
            name,
            statements: serde_json::from_str(statements)?,
            applied_at,
        })
    }
}

/// Records applied migrations in `_d1_migrations`; ids increase with each apply.
pub struct MigrationTracker<'db, D: D1Database + ?Sized> {
    db: &'db D,
}

impl<'db, D: D1Database + ?Sized> MigrationTracker<'db, D> {
    #[must_use]
    pub fn new(db: &'db D) -> Self {
        Self { db }
    }

    /// # Errors
    /// Returns the backend's execution error.
    pub async fn ensure_table(&self) -> Result<(), OrmError> {
        self.db
            .exec(&format!(
                "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (\n    \
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
                 name TEXT UNIQUE NOT NULL,\n    \
                 statements TEXT NOT NULL,\n    \
                 applied_at INTEGER NOT NULL\n);"
            ))
            .await
            .map(|_| ())
    }

    /// Applied migrations, oldest first.
    ///
    /// # Errors
    /// Returns the backend's execution error or `OrmError::Schema` for a malformed row.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, OrmError> {
        self.ensure_table().await?;
        let result = self
            .db
            .all(
                &format!("SELECT id, name, statements, applied_at FROM {MIGRATIONS_TABLE} ORDER BY id"),
                &[],
            )
            .await?;
        result.results.iter().map(AppliedMigration::from_row).collect()
    }

    /// Id of the newest applied migration, `None` before the first.
    ///
    /// # Errors
    /// Returns the backend's execution error.
    pub async fn current_version(&self) -> Result<Option<i64>, OrmError> {
        self.ensure_table().await?;
        let row = self
            .db
            .first(&format!("SELECT MAX(id) AS version FROM {MIGRATIONS_TABLE}"), &[])
            .await?;
        Ok(row.and_then(|r| r.get("version").and_then(SqlValue::as_int)))
    }

    /// # Errors
    /// Returns the backend's execution error.
    pub async fn is_applied(&self, name: &str) -> Result<bool, OrmError> {
        self.ensure_table().await?;
        let row = self
            .db
            .first(
                &format!("SELECT 1 AS present FROM {MIGRATIONS_TABLE} WHERE name = ? LIMIT 1"),
                &[SqlValue::from(name)],
            )
            .await?;
        Ok(row.is_some())
    }

    /// Run the migration and record it in one batch. Returns `false` without
    /// executing anything when it was already applied.
    ///
    /// # Errors
    /// Returns the batch's execution error; nothing is recorded in that case.
    pub async fn apply(&self, migration: &Migration) -> Result<bool, OrmError> {
        if self.is_applied(migration.name()).await? {
            tracing::debug!(migration = migration.name(), "migration already applied");
            return Ok(false);
        }
        let mut batch: Vec<BoundStatement> = migration
            .statements()
            .iter()
            .flat_map(|text| split_statements(text))
            .map(|sql| BoundStatement::new(sql, Vec::new()))
            .collect();
        batch.push(BoundStatement::new(
            format!("INSERT INTO {MIGRATIONS_TABLE} (name, statements, applied_at) VALUES (?, ?, ?)"),
            vec![
                SqlValue::from(migration.name()),
                SqlValue::Text(serde_json::to_string(migration.statements())?),
                SqlValue::Int(Utc::now().timestamp()),
            ],
        ));
        self.db.batch(batch).await?;
        tracing::debug!(migration = migration.name(), "migration applied");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        assert!(Migration::new("0001_add-qty", vec!["SELECT 1".into()]).is_ok());
        assert!(matches!(
            Migration::new("add qty", vec!["SELECT 1".into()]),
            Err(OrmError::Schema(_))
        ));
        assert!(matches!(Migration::new("empty", Vec::new()), Err(OrmError::Schema(_))));
    }

    #[test]
    fn empty_diff_is_not_a_migration() {
        assert!(Migration::from_diff("noop", &SchemaDiff::default()).is_err());
    }
}
