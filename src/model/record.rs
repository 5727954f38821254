use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use super::schema::ModelSchema;
use crate::codec;
use crate::database::D1Database;
use crate::error::OrmError;
use crate::query_builder::dml;
use crate::types::SqlValue;

/// One model instance: values aligned with the schema's field order.
///
/// `None` marks a deferred field that a projection did not load.
#[derive(Clone)]
pub struct Record {
    schema: Arc<ModelSchema>,
    values: Vec<Option<SqlValue>>,
    saved: bool,
}

impl Record {
    /// Construct an unsaved record, applying field defaults before `assignments`.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown field names and
    /// `OrmError::Validation` for values of the wrong type.
    pub fn new<K: AsRef<str>>(
        schema: &Arc<ModelSchema>,
        assignments: impl IntoIterator<Item = (K, SqlValue)>,
    ) -> Result<Self, OrmError> {
        let values = schema
            .fields()
            .iter()
            .map(|field| match field.default_value() {
                Some(default) if !field.is_server_generated() => field.coerce(default.produce()),
                _ => Ok(SqlValue::Null),
            })
            .map(|value| value.map(Some))
            .collect::<Result<Vec<_>, _>>()?;
        let mut record = Self::from_parts(Arc::clone(schema), values, false);
        for (name, value) in assignments {
            record.set(name.as_ref(), value)?;
        }
        Ok(record)
    }

    /// Build a record from a serializable struct whose keys are field names.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for keys that are not fields and
    /// `OrmError::Validation`/`Serialization` when values do not fit.
    pub fn from_serialize<T: Serialize>(schema: &Arc<ModelSchema>, value: &T) -> Result<Self, OrmError> {
        let JsonValue::Object(map) = serde_json::to_value(value)? else {
            return Err(OrmError::Query(format!(
                "'{}' records must be built from a JSON object",
                schema.name()
            )));
        };
        let mut record = Self::new::<&str>(schema, [])?;
        for (key, json) in map {
            let field = schema.require_field(&key)?;
            let value = codec::from_json(field, json)?;
            record.values[schema.position(&key).unwrap_or_default()] = Some(value);
        }
        Ok(record)
    }

    pub(crate) fn from_parts(
        schema: Arc<ModelSchema>,
        values: Vec<Option<SqlValue>>,
        saved: bool,
    ) -> Self {
        Self {
            schema,
            values,
            saved,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub(crate) fn raw_values(&self) -> &[Option<SqlValue>] {
        &self.values
    }

    /// Value of a loaded field; `None` for unknown or deferred fields.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.schema
            .position(name)
            .and_then(|idx| self.values[idx].as_ref())
    }

    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assign a field, coercing the value to the field's type.
    ///
    /// # Errors
    /// Returns `OrmError::Query` for unknown fields and `OrmError::Validation`
    /// for values of the wrong type.
    pub fn set(&mut self, name: &str, value: impl Into<SqlValue>) -> Result<(), OrmError> {
        let field = self.schema.require_field(name)?;
        let value = field.coerce(value.into())?;
        let idx = self.schema.position(name).unwrap_or_default();
        self.values[idx] = Some(value);
        Ok(())
    }

    /// Primary key value (`Null` until the record is inserted).
    #[must_use]
    pub fn pk(&self) -> &SqlValue {
        self.values[self.schema.pk_index()]
            .as_ref()
            .unwrap_or(&SqlValue::Null)
    }

    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.pk().as_int()
    }

    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Loaded fields as a JSON object, in declaration order.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            if let Some(value) = value {
                map.insert(field.name().to_owned(), value.to_json());
            }
        }
        JsonValue::Object(map)
    }

    /// Deserialize the loaded fields into a typed struct.
    ///
    /// # Errors
    /// Returns `OrmError::Serialization` when the struct does not match the record.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, OrmError> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    fn touch_auto_now(&mut self) {
        let now = SqlValue::Timestamp(Utc::now());
        for (idx, field) in self.schema.fields().iter().enumerate() {
            if field.is_auto_now() {
                self.values[idx] = field.coerce(now.clone()).ok();
            }
        }
    }

    /// Insert the record, or update every non-key column when it was already saved.
    ///
    /// After an insert the record is refreshed from the returned row, so
    /// engine-supplied values (key, `auto_now_add`) become visible.
    ///
    /// # Errors
    /// Returns validation errors before execution, or the execution error.
    pub async fn save<D: D1Database + ?Sized>(&mut self, db: &D) -> Result<(), OrmError> {
        self.touch_auto_now();
        if self.saved && !self.pk().is_null() {
            let stmt = dml::update_by_pk(self)?;
            db.run(&stmt.sql, &stmt.params).await?;
            return Ok(());
        }
        let stmt = dml::insert_returning(self)?;
        let row = db
            .first(&stmt.sql, &stmt.params)
            .await?
            .ok_or_else(|| OrmError::Execution("INSERT returned no row".into()))?;
        *self = codec::decode_row(&self.schema, &row);
        Ok(())
    }

    /// Delete this record by primary key; returns the number of rows removed.
    ///
    /// # Errors
    /// Returns `OrmError::Query` if the record has no primary key yet.
    pub async fn delete<D: D1Database + ?Sized>(&mut self, db: &D) -> Result<usize, OrmError> {
        let stmt = dml::delete_by_pk(self)?;
        let result = db.run(&stmt.sql, &stmt.params).await?;
        self.saved = false;
        Ok(result.meta.changes)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.schema.name())
            .field("values", &self.to_json())
            .field("saved", &self.saved)
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema) && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
    use serde::Deserialize;

    fn items() -> Arc<ModelSchema> {
        ModelSchema::builder("Item")
            .table("items")
            .field(Field::string("name").unique().not_null())
            .field(Field::integer("qty").default(0))
            .field(Field::boolean("active").default(true))
            .field(Field::json("tags").default_factory(|| SqlValue::Json(serde_json::json!([]))))
            .build()
            .unwrap()
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        name: String,
        qty: i64,
        active: bool,
    }

    #[test]
    fn defaults_apply_at_construction() {
        let record = Record::new(&items(), [("name", SqlValue::from("a"))]).unwrap();
        assert_eq!(record.get("qty"), Some(&SqlValue::Int(0)));
        assert_eq!(record.get("active"), Some(&SqlValue::Bool(true)));
        assert_eq!(record.get("tags"), Some(&SqlValue::Json(serde_json::json!([]))));
        assert_eq!(record.pk(), &SqlValue::Null);
        assert!(!record.is_saved());
    }

    #[test]
    fn set_validates_names_and_types() {
        let mut record = Record::new::<&str>(&items(), []).unwrap();
        assert!(matches!(record.set("nope", 1), Err(OrmError::Query(_))));
        assert!(matches!(record.set("qty", "x"), Err(OrmError::Validation { .. })));
        record.set("qty", 5).unwrap();
        assert_eq!(record.get("qty"), Some(&SqlValue::Int(5)));
    }

    #[test]
    fn typed_round_trip_through_serde() {
        let schema = items();
        let item = Item {
            name: "widget".into(),
            qty: 3,
            active: false,
        };
        let record = Record::from_serialize(&schema, &item).unwrap();
        assert_eq!(record.get("active"), Some(&SqlValue::Bool(false)));
        let back: Item = record.deserialize().unwrap();
        assert_eq!(back, item);
    }
}
