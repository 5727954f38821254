//! Conversions between stored rows and model records.
//!
//! Reads lift storage forms (0/1 integers, JSON text, Unix seconds) into the
//! field's semantic variant; writes validate and lower them again before any
//! statement is built.

use std::sync::Arc;

use chrono::DateTime;
use serde_json::Value as JsonValue;

use crate::error::OrmError;
use crate::model::{Field, FieldType, ModelSchema, Record};
use crate::results::Row;
use crate::types::SqlValue;

/// Decode one stored cell for `field`.
///
/// JSON text that fails to parse is kept as the raw text and logged; a corrupt
/// cell never fails the whole read.
#[must_use]
pub fn decode_value(field: &Field, raw: &SqlValue) -> SqlValue {
    match (field.field_type(), raw) {
        (_, SqlValue::Null) => SqlValue::Null,
        (FieldType::Boolean, SqlValue::Int(i)) => SqlValue::Bool(*i != 0),
        (FieldType::Json, SqlValue::Text(text)) => match serde_json::from_str(text) {
            Ok(value) => SqlValue::Json(value),
            Err(e) => {
                tracing::warn!(
                    field = field.name(),
                    error = %e,
                    "stored JSON could not be decoded; returning raw text"
                );
                SqlValue::Text(text.clone())
            }
        },
        (FieldType::Timestamp, SqlValue::Int(secs)) => DateTime::from_timestamp(*secs, 0)
            .map_or_else(|| SqlValue::Int(*secs), SqlValue::Timestamp),
        #[allow(clippy::cast_precision_loss)]
        (FieldType::Float, SqlValue::Int(i)) => SqlValue::Float(*i as f64),
        (_, other) => other.clone(),
    }
}

/// Lower an already coerced value to the form the engine stores.
#[must_use]
pub fn lower_value(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Bool(b) => SqlValue::Int(i64::from(b)),
        SqlValue::Json(v) => SqlValue::Text(v.to_string()),
        SqlValue::Timestamp(ts) => SqlValue::Int(ts.timestamp()),
        other => other,
    }
}

/// Validate and lower a value destined for an INSERT or UPDATE of `field`.
///
/// # Errors
/// Returns `OrmError::Validation` for type, nullability or length violations.
pub fn encode_value(field: &Field, value: SqlValue) -> Result<SqlValue, OrmError> {
    let value = field.coerce(value)?;
    field.validate(&value)?;
    Ok(lower_value(value))
}

/// Coerce and lower a filter operand; nullability does not apply to comparisons.
///
/// # Errors
/// Returns `OrmError::Validation` if the operand cannot represent the field type.
pub fn encode_operand(field: &Field, value: SqlValue) -> Result<SqlValue, OrmError> {
    field.coerce(value).map(lower_value)
}

/// Build a record from a raw row.
///
/// Columns that are not fields of the model are ignored; fields absent from
/// the row stay deferred.
#[must_use]
pub fn decode_row(schema: &Arc<ModelSchema>, row: &Row) -> Record {
    let mut values = vec![None; schema.fields().len()];
    for (column, raw) in row.iter() {
        match schema.position(column) {
            Some(idx) => values[idx] = Some(decode_value(&schema.fields()[idx], raw)),
            None => tracing::debug!(column, table = schema.table_name(), "ignoring unmapped column"),
        }
    }
    Record::from_parts(Arc::clone(schema), values, true)
}

/// Columns and lowered values for an INSERT of `record`.
///
/// Server generated fields that are still unset are omitted so the engine
/// supplies them.
///
/// # Errors
/// Returns `OrmError::Validation` for the first field that violates its contract.
pub fn encode_insert(record: &Record) -> Result<Vec<(&str, SqlValue)>, OrmError> {
    let schema = record.schema();
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (field, value) in schema.fields().iter().zip(record.raw_values()) {
        let value = value.clone().unwrap_or(SqlValue::Null);
        if value.is_null() && field.is_server_generated() {
            continue;
        }
        columns.push((field.name(), encode_value(field, value)?));
    }
    Ok(columns)
}

/// Validate `field = value` assignments for an UPDATE.
///
/// # Errors
/// Returns `OrmError::Query` for unknown or primary-key fields and
/// `OrmError::Validation` for values violating a field contract.
pub fn encode_assignments<'s, K: AsRef<str>>(
    schema: &'s ModelSchema,
    assignments: impl IntoIterator<Item = (K, SqlValue)>,
) -> Result<Vec<(&'s str, SqlValue)>, OrmError> {
    let mut out: Vec<(&str, SqlValue)> = Vec::new();
    for (name, value) in assignments {
        let field = schema.require_field(name.as_ref())?;
        if field.is_primary_key() {
            return Err(OrmError::Query(format!(
                "primary key '{}' cannot be updated",
                field.name()
            )));
        }
        let encoded = encode_value(field, value)?;
        match out.iter_mut().find(|(col, _)| *col == field.name()) {
            Some(slot) => slot.1 = encoded,
            None => out.push((field.name(), encoded)),
        }
    }
    Ok(out)
}

/// Convert a JSON value (e.g. from a serialized struct) to a field value.
///
/// # Errors
/// Returns `OrmError::Validation` when the JSON shape does not fit the field.
pub fn from_json(field: &Field, value: JsonValue) -> Result<SqlValue, OrmError> {
    let raw = match (field.field_type(), value) {
        (_, JsonValue::Null) => SqlValue::Null,
        (FieldType::Json, v) => SqlValue::Json(v),
        (_, JsonValue::Bool(b)) => SqlValue::Bool(b),
        (_, JsonValue::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Float(n.as_f64().unwrap_or_default()),
        },
        (_, JsonValue::String(s)) => SqlValue::Text(s),
        (_, other) => {
            return Err(OrmError::validation(
                field.name(),
                format!("cannot store JSON {other} in a {:?} field", field.field_type()),
            ));
        }
    };
    field.coerce(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn game() -> Arc<ModelSchema> {
        ModelSchema::builder("SampleGame")
            .table("test_games")
            .field(Field::string("title").max_length(200).not_null())
            .field(Field::integer("score").default(0))
            .field(Field::boolean("is_published").default(false))
            .field(Field::timestamp("created_at").auto_now_add())
            .field(Field::json("metadata"))
            .build()
            .unwrap()
    }

    #[test]
    fn decodes_storage_forms() {
        let schema = game();
        let row = Row::from_pairs([
            ("id", SqlValue::Int(1)),
            ("title", SqlValue::Text("Test Game".into())),
            ("score", SqlValue::Int(100)),
            ("is_published", SqlValue::Int(1)),
            ("created_at", SqlValue::Int(1_640_995_200)),
            ("metadata", SqlValue::Text(r#"{"key": "value"}"#.into())),
            ("extra", SqlValue::Int(9)),
        ]);
        let record = decode_row(&schema, &row);
        assert!(record.is_saved());
        assert_eq!(record.get("is_published"), Some(&SqlValue::Bool(true)));
        assert_eq!(record.get("metadata"), Some(&SqlValue::Json(json!({"key": "value"}))));
        assert_eq!(
            record.get("created_at").and_then(SqlValue::as_timestamp).map(|t| t.timestamp()),
            Some(1_640_995_200)
        );
    }

    #[test]
    fn corrupt_json_falls_back_to_raw_text() {
        let field = Field::json("metadata");
        assert_eq!(
            decode_value(&field, &SqlValue::Text("{not json".into())),
            SqlValue::Text("{not json".into())
        );
    }

    #[test]
    fn missing_columns_stay_deferred() {
        let schema = game();
        let record = decode_row(&schema, &Row::from_pairs([("title", SqlValue::Text("t".into()))]));
        assert_eq!(record.get("score"), None);
        assert!(!record.is_loaded("score"));
    }

    #[test]
    fn insert_omits_server_generated_columns() {
        let schema = game();
        let record = Record::new(&schema, [("title", SqlValue::from("x"))]).unwrap();
        let cols = encode_insert(&record).unwrap();
        let names: Vec<&str> = cols.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["title", "score", "is_published", "metadata"]);
        assert_eq!(cols[2].1, SqlValue::Int(0));
    }

    #[test]
    fn insert_rejects_null_and_overlong() {
        let schema = game();
        let missing = Record::new(&schema, [("score", SqlValue::Int(1))]).unwrap();
        assert!(matches!(
            encode_insert(&missing),
            Err(OrmError::Validation { ref field, .. }) if field == "title"
        ));
        let long = Record::new(&schema, [("title", SqlValue::Text("x".repeat(201)))]).unwrap();
        assert!(matches!(encode_insert(&long), Err(OrmError::Validation { .. })));
    }

    #[test]
    fn assignments_reject_primary_key_and_unknown_fields() {
        let schema = game();
        assert!(matches!(
            encode_assignments(&schema, [("id", SqlValue::Int(3))]),
            Err(OrmError::Query(_))
        ));
        assert!(matches!(
            encode_assignments(&schema, [("nope", SqlValue::Int(3))]),
            Err(OrmError::Query(_))
        ));
        let ok = encode_assignments(&schema, [("metadata", SqlValue::Json(json!([1, 2])))]).unwrap();
        assert_eq!(ok, vec![("metadata", SqlValue::Text("[1,2]".into()))]);
    }

    #[test]
    fn json_input_follows_field_type() {
        let schema = game();
        let flag = schema.field("is_published").unwrap();
        assert_eq!(from_json(flag, json!(true)).unwrap(), SqlValue::Bool(true));
        let meta = schema.field("metadata").unwrap();
        assert_eq!(from_json(meta, json!({"a": 1})).unwrap(), SqlValue::Json(json!({"a": 1})));
        let score = schema.field("score").unwrap();
        assert!(from_json(score, json!([1])).is_err());
    }
}
