use crate::codec;
use crate::database::{BoundStatement, D1Database};
use crate::error::OrmError;
use crate::model::Record;
use crate::results::{D1Result, Row};
use crate::types::SqlValue;

use super::{OrderTerm, QuerySet};

impl QuerySet {
    pub(super) fn select_sql(&self, columns: &str, limit: Option<u64>, params: &mut Vec<SqlValue>) -> String {
        let where_clause = self.render_where(params);
        format!(
            "SELECT {columns} FROM {}{where_clause}{}{}",
            self.schema.table_name(),
            self.render_order(),
            self.render_window(limit)
        )
    }

    /// `SELECT` of the projected columns with filters, ordering and window applied.
    ///
    /// # Errors
    /// Infallible once chaining succeeded; kept fallible for symmetry with the other compilers.
    pub fn compile_select(&self) -> Result<BoundStatement, OrmError> {
        let mut params = Vec::new();
        let sql = self.select_sql(&self.select_columns(), self.limit, &mut params);
        Ok(BoundStatement::new(sql, params))
    }

    /// `COUNT(*)` over the same filters; a limit or offset is honoured by
    /// counting over a sub-select.
    ///
    /// # Errors
    /// See [`QuerySet::compile_select`].
    pub fn compile_count(&self) -> Result<BoundStatement, OrmError> {
        let mut params = Vec::new();
        let sql = if self.has_window() {
            let pk = self.schema.primary_key().name();
            let inner = self.select_sql(pk, self.limit, &mut params);
            format!("SELECT COUNT(*) AS count FROM ({inner})")
        } else {
            let where_clause = self.render_where(&mut params);
            format!(
                "SELECT COUNT(*) AS count FROM {}{where_clause}",
                self.schema.table_name()
            )
        };
        Ok(BoundStatement::new(sql, params))
    }

    /// # Errors
    /// See [`QuerySet::compile_select`].
    pub fn compile_exists(&self) -> Result<BoundStatement, OrmError> {
        let mut params = Vec::new();
        let limit = Some(self.limit.map_or(1, |l| l.min(1)));
        let sql = self.select_sql("1 AS present", limit, &mut params);
        Ok(BoundStatement::new(sql, params))
    }

    /// `SELECT` of exactly the named columns (all columns when `fields` is empty).
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown field names.
    pub fn compile_values(&self, fields: &[&str]) -> Result<BoundStatement, OrmError> {
        let columns = if fields.is_empty() {
            self.schema.column_list()
        } else {
            self.columns(fields)?;
            fields.join(", ")
        };
        let mut params = Vec::new();
        let sql = self.select_sql(&columns, self.limit, &mut params);
        Ok(BoundStatement::new(sql, params))
    }

    /// Single-row window, ordered by primary key when no ordering was requested.
    fn first_window(mut self) -> Self {
        if self.ordering.is_empty() {
            self.ordering.push(OrderTerm {
                column: self.schema.pk_index(),
                descending: false,
            });
        }
        self.limit = Some(self.limit.map_or(1, |l| l.min(1)));
        self
    }

    fn decode_all(&self, result: &D1Result) -> Vec<Record> {
        result
            .results
            .iter()
            .map(|row| codec::decode_row(&self.schema, row))
            .collect()
    }

    /// Execute and decode every matching row.
    ///
    /// # Errors
    /// Returns the backend's execution error.
    pub async fn all<D: D1Database + ?Sized>(self, db: &D) -> Result<Vec<Record>, OrmError> {
        let stmt = self.compile_select()?;
        let result = db.all(&stmt.sql, &stmt.params).await?;
        Ok(self.decode_all(&result))
    }

    /// First matching row, by the requested ordering or else by primary key.
    ///
    /// # Errors
    /// Returns the backend's execution error.
    pub async fn first<D: D1Database + ?Sized>(self, db: &D) -> Result<Option<Record>, OrmError> {
        let qs = self.first_window();
        let stmt = qs.compile_select()?;
        let row = db.first(&stmt.sql, &stmt.params).await?;
        Ok(row.map(|row| codec::decode_row(&qs.schema, &row)))
    }

    /// Number of matching rows, read directly from the `COUNT(*)` cell.
    ///
    /// # Errors
    /// Returns the backend's execution error, or `OrmError::Execution` if the
    /// engine did not return a count.
    pub async fn count<D: D1Database + ?Sized>(self, db: &D) -> Result<usize, OrmError> {
        let stmt = self.compile_count()?;
        let row = db.first(&stmt.sql, &stmt.params).await?;
        row.as_ref()
            .and_then(|row| row.get_by_index(0))
            .and_then(SqlValue::as_int)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| OrmError::Execution("COUNT(*) returned no value".into()))
    }

    /// # Errors
    /// Returns the backend's execution error.
    pub async fn exists<D: D1Database + ?Sized>(self, db: &D) -> Result<bool, OrmError> {
        let stmt = self.compile_exists()?;
        Ok(db.first(&stmt.sql, &stmt.params).await?.is_some())
    }

    /// The single matching row, or `None` when nothing matches.
    ///
    /// # Errors
    /// Returns `OrmError::Query` when more than one row matches.
    pub async fn get<D: D1Database + ?Sized>(mut self, db: &D) -> Result<Option<Record>, OrmError> {
        self.limit = Some(self.limit.map_or(2, |l| l.min(2)));
        let stmt = self.compile_select()?;
        let result = db.all(&stmt.sql, &stmt.params).await?;
        match result.results.as_slice() {
            [] => Ok(None),
            [row] => Ok(Some(codec::decode_row(&self.schema, row))),
            _ => Err(OrmError::Query(format!(
                "get() returned more than one {}",
                self.schema.name()
            ))),
        }
    }

    /// Rows holding only the named columns, decoded per field type.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown field names before execution.
    pub async fn values<D: D1Database + ?Sized>(
        self,
        db: &D,
        fields: &[&str],
    ) -> Result<Vec<Row>, OrmError> {
        let stmt = self.compile_values(fields)?;
        let result = db.all(&stmt.sql, &stmt.params).await?;
        let Some(first) = result.first() else {
            return Ok(Vec::new());
        };
        let names = first.column_names().to_vec();
        let decoded = result
            .results
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, raw)| match self.schema.field(column) {
                        Some(field) => codec::decode_value(field, raw),
                        None => raw.clone(),
                    })
                    .collect()
            })
            .collect();
        Ok(D1Result::from_rows(names, decoded).results)
    }
}
