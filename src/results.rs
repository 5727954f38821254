//! Row and result-envelope types shared by every backend.

mod envelope;
mod row;

pub use envelope::{D1Meta, D1Result};
pub use row::Row;
