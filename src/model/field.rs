use chrono::{DateTime, Utc};

use crate::error::OrmError;
use crate::types::SqlValue;

/// Semantic type of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Json,
}

impl FieldType {
    /// Column type used in generated DDL; `max_length` only applies to strings.
    #[must_use]
    pub fn sql_type(self, max_length: Option<usize>) -> String {
        match (self, max_length) {
            (FieldType::String, Some(len)) => format!("VARCHAR({len})"),
            (FieldType::String | FieldType::Json, _) => "TEXT".to_owned(),
            (FieldType::Integer | FieldType::Boolean | FieldType::Timestamp, _) => {
                "INTEGER".to_owned()
            }
            (FieldType::Float, _) => "REAL".to_owned(),
        }
    }
}

/// Value applied when a record is constructed without an explicit assignment.
#[derive(Debug, Clone)]
pub enum FieldDefault {
    Value(SqlValue),
    Factory(fn() -> SqlValue),
}

impl FieldDefault {
    #[must_use]
    pub fn produce(&self) -> SqlValue {
        match self {
            FieldDefault::Value(value) => value.clone(),
            FieldDefault::Factory(factory) => factory(),
        }
    }
}

/// Immutable metadata for one model attribute.
///
/// Built with the per-type constructors and chained modifiers:
/// ```rust
/// use d1_orm::prelude::*;
///
/// let title = Field::string("title").max_length(200).not_null();
/// assert_eq!(title.sql_type(), "VARCHAR(200)");
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    field_type: FieldType,
    null: bool,
    unique: bool,
    index: bool,
    max_length: Option<usize>,
    default: Option<FieldDefault>,
    primary_key: bool,
    auto_increment: bool,
    auto_now_add: bool,
    auto_now: bool,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            null: true,
            unique: false,
            index: false,
            max_length: None,
            default: None,
            primary_key: false,
            auto_increment: false,
            auto_now_add: false,
            auto_now: false,
        }
    }

    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    #[must_use]
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    #[must_use]
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Json)
    }

    /// The implicit `id INTEGER PRIMARY KEY AUTOINCREMENT` key.
    pub(crate) fn auto_id(name: &str) -> Self {
        let mut field = Self::integer(name).primary_key();
        field.auto_increment = true;
        field
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.null = false;
        self
    }

    #[must_use]
    pub fn nullable(mut self, null: bool) -> Self {
        self.null = null;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    #[must_use]
    pub fn default(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    #[must_use]
    pub fn default_factory(mut self, factory: fn() -> SqlValue) -> Self {
        self.default = Some(FieldDefault::Factory(factory));
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.null = false;
        self
    }

    /// Filled in by the engine on insert (`DEFAULT` current Unix time).
    #[must_use]
    pub fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self
    }

    /// Refreshed to the current time on every save and update.
    #[must_use]
    pub fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.null
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.index
    }

    #[must_use]
    pub fn max_len(&self) -> Option<usize> {
        self.max_length
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    #[must_use]
    pub fn is_auto_now_add(&self) -> bool {
        self.auto_now_add
    }

    #[must_use]
    pub fn is_auto_now(&self) -> bool {
        self.auto_now
    }

    /// Values the engine supplies itself; left out of INSERT column lists when unset.
    #[must_use]
    pub fn is_server_generated(&self) -> bool {
        self.auto_increment || self.auto_now_add
    }

    #[must_use]
    pub fn sql_type(&self) -> String {
        self.field_type.sql_type(self.max_length)
    }

    /// Normalize a value to this field's semantic variant.
    ///
    /// # Errors
    /// Returns `OrmError::Validation` when the value cannot represent this field's type.
    pub fn coerce(&self, value: SqlValue) -> Result<SqlValue, OrmError> {
        let mismatch = |value: &SqlValue| {
            OrmError::validation(
                &self.name,
                format!(
                    "expected {:?} value, got {}",
                    self.field_type,
                    value.kind()
                ),
            )
        };
        match (self.field_type, value) {
            (_, SqlValue::Null) => Ok(SqlValue::Null),
            (FieldType::String, v @ SqlValue::Text(_))
            | (FieldType::Integer, v @ SqlValue::Int(_))
            | (FieldType::Float, v @ SqlValue::Float(_))
            | (FieldType::Boolean, v @ SqlValue::Bool(_))
            | (FieldType::Json, v @ SqlValue::Json(_)) => Ok(v),
            #[allow(clippy::cast_precision_loss)]
            (FieldType::Float, SqlValue::Int(i)) => Ok(SqlValue::Float(i as f64)),
            (FieldType::Boolean, SqlValue::Int(i @ (0 | 1))) => Ok(SqlValue::Bool(i == 1)),
            (FieldType::Timestamp, SqlValue::Timestamp(ts)) => Ok(SqlValue::Timestamp(truncate(ts))),
            (FieldType::Timestamp, SqlValue::Int(secs)) => DateTime::from_timestamp(secs, 0)
                .map(SqlValue::Timestamp)
                .ok_or_else(|| mismatch(&SqlValue::Int(secs))),
            (FieldType::Timestamp, SqlValue::Text(text)) => DateTime::parse_from_rfc3339(&text)
                .map(|ts| SqlValue::Timestamp(truncate(ts.with_timezone(&Utc))))
                .map_err(|e| OrmError::validation(&self.name, format!("invalid timestamp: {e}"))),
            (FieldType::Json, other) => Ok(SqlValue::Json(other.to_json())),
            (_, other) => Err(mismatch(&other)),
        }
    }

    /// Check nullability and length constraints on an already-coerced value.
    ///
    /// # Errors
    /// Returns `OrmError::Validation` naming this field when a constraint is violated.
    pub fn validate(&self, value: &SqlValue) -> Result<(), OrmError> {
        if value.is_null() {
            if !self.null && !self.is_server_generated() {
                return Err(OrmError::validation(&self.name, "field cannot be null"));
            }
            return Ok(());
        }
        if let (Some(max), SqlValue::Text(text)) = (self.max_length, value) {
            let len = text.chars().count();
            if len > max {
                return Err(OrmError::validation(
                    &self.name,
                    format!("length {len} exceeds max_length {max}"),
                ));
            }
        }
        Ok(())
    }
}

/// Timestamps are stored at second precision.
fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}
