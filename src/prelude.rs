//! Convenient imports for common functionality.
//!
//! Brings in the model surface, the query builder, the database trait, the
//! schema manager and the builder macros.

pub use crate::database::{BoundStatement, D1Database, D1DatabaseExt, PreparedStatement};
pub use crate::error::OrmError;
pub use crate::model::{Field, FieldDefault, FieldType, Model, ModelSchema, Record};
pub use crate::query_builder::{Lookup, Manager, QueryPolicy, QueryPolicyBuilder, QuerySet};
pub use crate::results::{D1Meta, D1Result, Row};
pub use crate::schema::{
    Migration, MigrationTracker, SchemaDiff, SchemaLock, SchemaManager, SchemaOptions,
};
pub use crate::transaction::TransactionState;
pub use crate::types::{FilterArg, SqlValue};
pub use crate::{assignments, lookups, params};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{D1Shim, ShimOptions, ShimOptionsBuilder, TransactionDetection};
