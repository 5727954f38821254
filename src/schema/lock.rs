use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::OrmError;
use crate::model::{Field, FieldType, ModelSchema};

const LOCK_VERSION: u32 = 1;

/// Last-deployed schema, keyed by table name. The "before" side of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLock {
    pub version: u32,
    pub tables: BTreeMap<String, TableSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub model: String,
    pub columns: Vec<ColumnSnapshot>,
}

impl TableSnapshot {
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Declared type and constraints of one column as they were deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub name: String,
    pub field_type: FieldType,
    pub sql_type: String,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl From<&Field> for ColumnSnapshot {
    fn from(field: &Field) -> Self {
        Self {
            name: field.name().to_owned(),
            field_type: field.field_type(),
            sql_type: field.sql_type(),
            nullable: field.is_nullable() && !field.is_primary_key(),
            unique: field.is_unique(),
            primary_key: field.is_primary_key(),
            indexed: field.is_indexed(),
            default: super::default_clause(field),
        }
    }
}

impl Default for SchemaLock {
    fn default() -> Self {
        Self {
            version: LOCK_VERSION,
            tables: BTreeMap::new(),
        }
    }
}

impl SchemaLock {
    /// Snapshot the given models. The first model claiming a table wins.
    #[must_use]
    pub fn from_models(models: &[Arc<ModelSchema>]) -> Self {
        let mut lock = Self::default();
        for schema in models {
            lock.tables
                .entry(schema.table_name().to_owned())
                .or_insert_with(|| TableSnapshot {
                    model: schema.name().to_owned(),
                    columns: schema.fields().iter().map(ColumnSnapshot::from).collect(),
                });
        }
        lock
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Load a lock file; a missing file yields an empty lock.
    ///
    /// # Errors
    /// Returns `OrmError::Io` if the file cannot be read, `OrmError::Serialization`
    /// if it is not a lock, or `OrmError::Schema` for an unknown lock version.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, OrmError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no schema lock; starting empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let lock: Self = serde_json::from_str(&text)?;
        if lock.version != LOCK_VERSION {
            return Err(OrmError::Schema(format!(
                "unsupported schema lock version {} in {}",
                lock.version,
                path.display()
            )));
        }
        Ok(lock)
    }

    /// Write the lock as pretty-printed JSON, replacing any existing file.
    ///
    /// # Errors
    /// Returns `OrmError::Io` or `OrmError::Serialization`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), OrmError> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Check that `models` match this lock exactly.
    ///
    /// # Errors
    /// Returns `OrmError::Schema` listing the tables that drifted.
    pub fn verify(&self, models: &[Arc<ModelSchema>]) -> Result<(), OrmError> {
        let current = Self::from_models(models);
        let mut drifted: Vec<&str> = current
            .tables
            .iter()
            .filter(|(name, table)| self.tables.get(*name) != Some(table))
            .map(|(name, _)| name.as_str())
            .collect();
        drifted.extend(
            self.tables
                .keys()
                .filter(|name| !current.tables.contains_key(*name))
                .map(String::as_str),
        );
        if drifted.is_empty() {
            Ok(())
        } else {
            drifted.sort_unstable();
            Err(OrmError::Schema(format!(
                "schema lock out of date for: {}",
                drifted.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(with_qty: bool) -> Arc<ModelSchema> {
        let mut builder = ModelSchema::builder("Item")
            .table("items")
            .field(Field::string("name").unique().not_null());
        if with_qty {
            builder = builder.field(Field::integer("qty").default(0));
        }
        builder.build().unwrap()
    }

    #[test]
    fn snapshot_records_constraints() {
        let lock = SchemaLock::from_models(&[item(true)]);
        let table = lock.table("items").unwrap();
        assert_eq!(table.model, "Item");
        let id = table.column("id").unwrap();
        assert!(id.primary_key);
        assert!(!id.nullable);
        let name = table.column("name").unwrap();
        assert!(name.unique && !name.nullable);
        assert_eq!(table.column("qty").unwrap().default.as_deref(), Some("0"));
    }

    #[test]
    fn write_then_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.lock.json");
        let lock = SchemaLock::from_models(&[item(true)]);
        lock.write_to(&path).unwrap();
        assert_eq!(SchemaLock::read_from(&path).unwrap(), lock);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SchemaLock::read_from(dir.path().join("absent.json")).unwrap();
        assert!(lock.tables.is_empty());
    }

    #[test]
    fn verify_reports_drift() {
        let lock = SchemaLock::from_models(&[item(false)]);
        assert!(lock.verify(&[item(false)]).is_ok());
        let err = lock.verify(&[item(true)]).unwrap_err();
        assert!(err.to_string().contains("items"));
    }
}
