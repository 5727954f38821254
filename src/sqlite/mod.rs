// SQLite compatibility shim - emulates the remote store on an embedded engine
//
// - config: open options and their builder
// - params: SqlValue to SQLite value conversion
// - query: row extraction into the result envelope
// - executor: statement execution under the remote store's commit rules
// - connection: the async `D1Shim` handle

pub mod config;
mod connection;
mod executor;
pub mod params;
pub mod query;

pub use config::{ShimOptions, ShimOptionsBuilder, TransactionDetection};
pub use connection::D1Shim;
