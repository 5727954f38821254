use rusqlite::types::Value;

use crate::types::SqlValue;

/// Convert a single [`SqlValue`] to its stored `SQLite` form.
///
/// Booleans become 0/1, timestamps Unix seconds and JSON its serialized text.
#[must_use]
pub fn sql_value_to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(ts) => Value::Integer(ts.timestamp()),
        SqlValue::Json(json) => Value::Text(json.to_string()),
        SqlValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Owned `SQLite` parameter list for one statement.
pub struct Params(pub Vec<Value>);

impl Params {
    #[must_use]
    pub fn convert(params: &[SqlValue]) -> Self {
        Params(params.iter().map(sql_value_to_sqlite_value).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrowed params suitable for rusqlite execution.
    #[must_use]
    pub fn as_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.0.iter().map(|v| v as &dyn rusqlite::ToSql).collect()
    }
}
