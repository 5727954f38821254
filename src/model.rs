//! Field metadata, model schemas and records.

mod field;
mod record;
mod schema;

use std::sync::Arc;

pub use field::{Field, FieldDefault, FieldType};
pub use record::Record;
pub use schema::{ModelSchema, ModelSchemaBuilder, is_valid_identifier};

use crate::database::D1Database;
use crate::error::OrmError;
use crate::query_builder::Manager;
use crate::results::D1Result;
use crate::types::SqlValue;

/// A type that names a model schema, giving it an `objects()` entry point.
///
/// ```rust
/// use std::sync::{Arc, LazyLock};
/// use d1_orm::prelude::*;
///
/// static ITEM: LazyLock<Arc<ModelSchema>> = LazyLock::new(|| {
///     ModelSchema::builder("Item")
///         .table("items")
///         .field(Field::string("name").unique().not_null())
///         .field(Field::integer("qty").default(0))
///         .build()
///         .expect("valid schema")
/// });
///
/// struct Item;
///
/// impl Model for Item {
///     fn schema() -> Arc<ModelSchema> {
///         Arc::clone(&ITEM)
///     }
/// }
///
/// let compiled = Item::objects().filter("qty__gte", 1)?.compile_select()?;
/// assert_eq!(compiled.sql, "SELECT id, name, qty FROM items WHERE qty >= ?");
/// # Ok::<(), OrmError>(())
/// ```
#[allow(async_fn_in_trait)]
pub trait Model {
    fn schema() -> Arc<ModelSchema>;

    /// Fresh manager for this model.
    fn objects() -> Manager {
        Manager::new(Self::schema())
    }

    /// Unsaved record with defaults applied.
    ///
    /// # Errors
    /// Returns `OrmError` for unknown fields or mistyped values.
    fn new_record<K: AsRef<str>>(
        assignments: impl IntoIterator<Item = (K, SqlValue)>,
    ) -> Result<Record, OrmError> {
        Record::new(&Self::schema(), assignments)
    }

    /// Create this model's table and indexes if they do not exist.
    ///
    /// # Errors
    /// Returns the backend's execution error.
    async fn create_table<D: D1Database + ?Sized>(db: &D) -> Result<D1Result, OrmError> {
        Self::objects().create_table(db).await
    }
}
