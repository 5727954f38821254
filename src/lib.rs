//! Micro-ORM for request/response SQL stores in the D1 mould, plus a local
//! `SQLite` shim that reproduces the store's envelope and commit behaviour.

pub mod prelude;

pub mod codec;
pub mod database;
pub mod error;
pub mod model;
pub mod query_builder;
pub mod results;
pub mod schema;
pub mod statement;
pub mod transaction;
pub mod types;

mod macros;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use database::{BoundStatement, D1Database, D1DatabaseExt, PreparedStatement};
pub use error::OrmError;
pub use model::{Field, FieldType, Model, ModelSchema, Record};
pub use query_builder::{Manager, QueryPolicy, QuerySet};
pub use results::{D1Meta, D1Result, Row};
pub use schema::{SchemaLock, SchemaManager};
pub use transaction::TransactionState;
pub use types::{FilterArg, SqlValue};

#[cfg(feature = "sqlite")]
pub use sqlite::{D1Shim, ShimOptions, TransactionDetection};
