use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::SqlValue;

/// A single row returned by a statement: an ordered column-name to value mapping.
///
/// Column names and the name-to-index cache are shared by every row of one
/// result, so rows stay cheap to clone.
#[derive(Debug, Clone)]
pub struct Row {
    column_names: Arc<Vec<String>>,
    values: Vec<SqlValue>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a row with its own column index cache.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self::with_cache(column_names, values, cache)
    }

    pub(crate) fn with_cache(
        column_names: Arc<Vec<String>>,
        values: Vec<SqlValue>,
        column_index_cache: Arc<HashMap<String, usize>>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache,
        }
    }

    /// Build a row from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<SqlValue>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self::new(Arc::new(names), values)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Value of a column by name, or `None` if the row has no such column.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Name to index map; a repeated name resolves to its first column.
pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    index
}
