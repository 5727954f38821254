use std::sync::Arc;

use crate::codec;
use crate::database::D1Database;
use crate::error::OrmError;
use crate::model::{ModelSchema, Record};
use crate::results::D1Result;
use crate::schema::SchemaManager;
use crate::types::{FilterArg, SqlValue};

use super::{QueryPolicy, QuerySet, dml};

/// Entry point for model-level queries (`Model::objects()`).
///
/// Holds no query state of its own; every method starts a fresh [`QuerySet`].
#[derive(Debug, Clone)]
pub struct Manager {
    schema: Arc<ModelSchema>,
    policy: QueryPolicy,
}

impl Manager {
    #[must_use]
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let policy = schema.policy().clone();
        Self { schema, policy }
    }

    /// Use a different policy for query sets started from this manager.
    #[must_use]
    pub fn with_policy(mut self, policy: QueryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    #[must_use]
    pub fn all(&self) -> QuerySet {
        QuerySet::with_policy(Arc::clone(&self.schema), self.policy.clone())
    }

    /// # Errors
    /// See [`QuerySet::filter`].
    pub fn filter(&self, key: &str, value: impl Into<FilterArg>) -> Result<QuerySet, OrmError> {
        self.all().filter(key, value)
    }

    /// # Errors
    /// See [`QuerySet::filter`].
    pub fn filter_all<K: AsRef<str>>(
        &self,
        lookups: impl IntoIterator<Item = (K, FilterArg)>,
    ) -> Result<QuerySet, OrmError> {
        self.all().filter_all(lookups)
    }

    /// # Errors
    /// See [`QuerySet::filter`].
    pub fn exclude(&self, key: &str, value: impl Into<FilterArg>) -> Result<QuerySet, OrmError> {
        self.all().exclude(key, value)
    }

    /// # Errors
    /// Returns `OrmError::Query` for unknown field names.
    pub fn order_by(&self, fields: &[&str]) -> Result<QuerySet, OrmError> {
        self.all().order_by(fields)
    }

    /// Build, validate and insert one record with a single `INSERT ... RETURNING`.
    ///
    /// # Errors
    /// Returns `OrmError::Validation`/`Query` before execution, or
    /// `OrmError::Integrity` when the engine rejects the row.
    pub async fn create<D, K>(
        &self,
        db: &D,
        assignments: impl IntoIterator<Item = (K, SqlValue)>,
    ) -> Result<Record, OrmError>
    where
        D: D1Database + ?Sized,
        K: AsRef<str>,
    {
        let mut record = Record::new(&self.schema, assignments)?;
        record.save(db).await?;
        Ok(record)
    }

    /// Insert many records in one atomic batch; nothing is stored if any row fails.
    ///
    /// # Errors
    /// Returns the first validation error before execution, or the batch's execution error.
    pub async fn bulk_create<D: D1Database + ?Sized>(
        &self,
        db: &D,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, OrmError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let statements = records
            .iter()
            .map(|record| {
                if !Arc::ptr_eq(record.schema(), &self.schema) {
                    return Err(OrmError::Query(format!(
                        "cannot bulk_create a {} through the {} manager",
                        record.schema().name(),
                        self.schema.name()
                    )));
                }
                dml::insert_returning(record)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let results = db.batch(statements).await?;
        results
            .iter()
            .map(|result| {
                result
                    .first()
                    .map(|row| codec::decode_row(&self.schema, row))
                    .ok_or_else(|| OrmError::Execution("INSERT returned no row".into()))
            })
            .collect()
    }

    /// The single record matching all `lookups`, or `None`.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for invalid lookups or when more than one row matches.
    pub async fn get<D, K>(
        &self,
        db: &D,
        lookups: impl IntoIterator<Item = (K, FilterArg)>,
    ) -> Result<Option<Record>, OrmError>
    where
        D: D1Database + ?Sized,
        K: AsRef<str>,
    {
        self.filter_all(lookups)?.get(db).await
    }

    /// `CREATE TABLE IF NOT EXISTS` plus declared indexes for this model.
    ///
    /// # Errors
    /// Returns the backend's execution error.
    pub async fn create_table<D: D1Database + ?Sized>(&self, db: &D) -> Result<D1Result, OrmError> {
        let mut sql = SchemaManager::create_table_sql(&self.schema);
        for index in SchemaManager::index_sql(&self.schema) {
            sql.push('\n');
            sql.push_str(&index);
        }
        db.exec(&sql).await
    }
}
