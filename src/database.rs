//! The request/response surface every backend exposes.
//!
//! Query-builder terminals only talk to a [`D1Database`]; the local
//! [`D1Shim`](crate::sqlite::D1Shim) implements it, and so can a driver for the
//! remote store or a recording stub in tests.

use async_trait::async_trait;

use crate::error::OrmError;
use crate::results::{D1Result, Row};
use crate::types::SqlValue;

/// A SQL statement together with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl BoundStatement {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Number of `?` placeholders outside string literals and comments.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        crate::statement::count_placeholders(&self.sql)
    }
}

#[async_trait]
pub trait D1Database: Send + Sync {
    /// Execute one statement and return every row it produced.
    async fn all(&self, sql: &str, params: &[SqlValue]) -> Result<D1Result, OrmError>;

    /// Execute one statement for its effect; the envelope carries the same metadata as `all`.
    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<D1Result, OrmError>;

    /// Execute one statement and return its first row, if any.
    async fn first(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, OrmError> {
        Ok(self.all(sql, params).await?.into_first())
    }

    /// Execute unparameterized, possibly multi-statement text.
    async fn exec(&self, sql: &str) -> Result<D1Result, OrmError>;

    /// Execute statements atomically: all commit together or none do.
    async fn batch(&self, statements: Vec<BoundStatement>) -> Result<Vec<D1Result>, OrmError>;
}

/// `prepare(sql).bind(..)` chaining on top of any [`D1Database`].
pub trait D1DatabaseExt: D1Database {
    fn prepare(&self, sql: &str) -> PreparedStatement<'_, Self> {
        PreparedStatement {
            db: self,
            statement: BoundStatement::new(sql, Vec::new()),
        }
    }
}

impl<D: D1Database + ?Sized> D1DatabaseExt for D {}

/// A statement prepared against a database, waiting for parameters.
pub struct PreparedStatement<'db, D: D1Database + ?Sized> {
    db: &'db D,
    statement: BoundStatement,
}

impl<'db, D: D1Database + ?Sized> PreparedStatement<'db, D> {
    /// Replace the bound parameters, in placeholder order.
    #[must_use]
    pub fn bind(mut self, params: impl IntoIterator<Item = SqlValue>) -> Self {
        self.statement.params = params.into_iter().collect();
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    /// Detach the statement for use in [`D1Database::batch`].
    #[must_use]
    pub fn into_bound(self) -> BoundStatement {
        self.statement
    }

    /// # Errors
    /// Returns the backend's translated execution error.
    pub async fn all(&self) -> Result<D1Result, OrmError> {
        self.db.all(&self.statement.sql, &self.statement.params).await
    }

    /// # Errors
    /// Returns the backend's translated execution error.
    pub async fn run(&self) -> Result<D1Result, OrmError> {
        self.db.run(&self.statement.sql, &self.statement.params).await
    }

    /// # Errors
    /// Returns the backend's translated execution error.
    pub async fn first(&self) -> Result<Option<Row>, OrmError> {
        self.db.first(&self.statement.sql, &self.statement.params).await
    }

    /// Single cell of the first row, `None` when there is no row.
    ///
    /// # Errors
    /// Returns `OrmError::Query` if the first row has no such column.
    pub async fn first_value(&self, column: &str) -> Result<Option<SqlValue>, OrmError> {
        match self.first().await? {
            None => Ok(None),
            Some(row) => row
                .get(column)
                .cloned()
                .map(Some)
                .ok_or_else(|| OrmError::Query(format!("column '{column}' not in result"))),
        }
    }

    /// Rows as positional value arrays.
    ///
    /// # Errors
    /// Returns the backend's translated execution error.
    pub async fn raw(&self) -> Result<Vec<Vec<SqlValue>>, OrmError> {
        Ok(self.all().await?.raw())
    }
}
