use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Values that can be bound as statement parameters, read back from rows, or
/// held by a model [`Record`](crate::model::Record).
///
/// Storage forms (`Int`, `Float`, `Text`, `Blob`, `Null`) come back from the
/// engine; the codec lifts them to `Bool`, `Json` and `Timestamp` according to
/// the field type. The shim lowers those semantic variants again on bind:
/// ```rust
/// use d1_orm::prelude::*;
///
/// let params = params![1, "alice", true];
/// assert_eq!(params[2], SqlValue::Bool(true));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL, also the "unset" representation of a field
    Null,
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value, stored as 0/1
    Bool(bool),
    /// Timestamp value, stored as Unix seconds
    Timestamp(DateTime<Utc>),
    /// JSON value, stored as its serialized text
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(value) => Some(*value),
            SqlValue::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(value) => Some(*value),
            SqlValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SqlValue::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::Timestamp(value) => Some(*value),
            SqlValue::Int(secs) => DateTime::from_timestamp(*secs, 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let SqlValue::Json(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let SqlValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// JSON rendering used by the result envelope and `Record::to_json`.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Int(i) => JsonValue::from(*i),
            SqlValue::Float(f) => JsonValue::from(*f),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
            SqlValue::Json(v) => v.clone(),
            SqlValue::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }

    /// Short type label for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bool(_) => "boolean",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Json(_) => "json",
            SqlValue::Blob(_) => "blob",
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

macro_rules! impl_from_for_sql_value {
    ($($ty:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::$variant($conv(value))
                }
            }
        )*
    };
}

impl_from_for_sql_value! {
    i64 => Int via |v| v,
    i32 => Int via i64::from,
    u32 => Int via i64::from,
    f64 => Float via |v| v,
    bool => Bool via |v| v,
    String => Text via |v| v,
    &str => Text via str::to_owned,
    DateTime<Utc> => Timestamp via |v| v,
    JsonValue => Json via |v| v,
    Vec<u8> => Blob via |v| v,
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Right-hand side of a filter lookup: a single value, or a list for `in`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterArg {
    One(SqlValue),
    Many(Vec<SqlValue>),
}

impl From<SqlValue> for FilterArg {
    fn from(value: SqlValue) -> Self {
        FilterArg::One(value)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for FilterArg {
    fn from(values: Vec<T>) -> Self {
        FilterArg::Many(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue>, const N: usize> From<[T; N]> for FilterArg {
    fn from(values: [T; N]) -> Self {
        FilterArg::Many(values.into_iter().map(Into::into).collect())
    }
}

macro_rules! impl_from_for_filter_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FilterArg {
                fn from(value: $ty) -> Self {
                    FilterArg::One(SqlValue::from(value))
                }
            }
        )*
    };
}

impl_from_for_filter_arg!(i64, i32, u32, f64, bool, String, &str, DateTime<Utc>, JsonValue);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_read_back_as_booleans() {
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(0).as_bool(), Some(false));
        assert_eq!(SqlValue::Int(7).as_bool(), Some(true));
        assert_eq!(SqlValue::Text("1".into()).as_bool(), None);
    }

    #[test]
    fn option_maps_none_to_null() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }

    #[test]
    fn filter_args_from_lists() {
        assert_eq!(
            FilterArg::from(vec![1, 2]),
            FilterArg::Many(vec![SqlValue::Int(1), SqlValue::Int(2)])
        );
        assert_eq!(FilterArg::from("a"), FilterArg::One(SqlValue::Text("a".into())));
    }

    #[test]
    fn serializes_as_plain_json() {
        let json = serde_json::to_string(&SqlValue::Json(serde_json::json!({"k": 1}))).unwrap();
        assert_eq!(json, r#"{"k":1}"#);
        assert_eq!(serde_json::to_string(&SqlValue::Bool(true)).unwrap(), "true");
    }
}
