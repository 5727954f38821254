use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::row::{Row, index_columns};
use crate::types::SqlValue;

/// Execution metadata attached to every result, matching the remote store's `meta` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct D1Meta {
    /// Rowid of the last inserted row; only set for INSERT-shaped statements.
    pub last_row_id: Option<i64>,
    /// Rows modified by the statement (0 for read-only statements).
    pub changes: usize,
    pub rows_read: usize,
    pub rows_written: usize,
    /// Wall-clock time around the engine call, in milliseconds.
    pub duration: f64,
}

impl D1Meta {
    pub(crate) fn set_duration(&mut self, elapsed: Duration) {
        self.duration = elapsed.as_secs_f64() * 1000.0;
    }
}

/// The uniform `{ results, success, meta }` envelope returned by every statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct D1Result {
    pub results: Vec<Row>,
    pub success: bool,
    pub meta: D1Meta,
}

impl D1Result {
    /// Empty successful result with preallocated row capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
            success: true,
            meta: D1Meta::default(),
        }
    }

    /// Build a successful result from column names and raw value rows.
    #[must_use]
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let names = Arc::new(column_names);
        let cache = Arc::new(index_columns(&names));
        let mut result = Self::with_capacity(rows.len());
        result.results = rows
            .into_iter()
            .map(|values| Row::with_cache(Arc::clone(&names), values, Arc::clone(&cache)))
            .collect();
        result
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.results.first()
    }

    #[must_use]
    pub fn into_first(self) -> Option<Row> {
        self.results.into_iter().next()
    }

    /// Rows as positional value arrays.
    #[must_use]
    pub fn raw(&self) -> Vec<Vec<SqlValue>> {
        self.results.iter().map(|row| row.values().to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_in_remote_shape() {
        let mut result = D1Result::from_rows(vec!["id".into()], vec![vec![SqlValue::Int(1)]]);
        result.meta.rows_read = 1;
        result.meta.set_duration(Duration::from_millis(2));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["results"][0]["id"], 1);
        assert_eq!(json["meta"]["rows_read"], 1);
        assert_eq!(json["meta"]["rows_written"], 0);
        assert!(json["meta"]["last_row_id"].is_null());
        assert!((json["meta"]["duration"].as_f64().unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rows_share_column_names() {
        let result = D1Result::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![SqlValue::Int(1), SqlValue::Null], vec![SqlValue::Int(2), SqlValue::Null]],
        );
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[1].get("a"), Some(&SqlValue::Int(2)));
        assert_eq!(result.raw()[0], vec![SqlValue::Int(1), SqlValue::Null]);
    }
}
