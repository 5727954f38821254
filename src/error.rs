use thiserror::Error;

/// Every failure surfaced by the ORM and the compatibility shim.
///
/// `Validation` and `Query` are raised while compiling, before any statement
/// reaches a database. `Integrity` and `Transaction` come back from execution;
/// engine errors are re-typed into these variants so callers never match on
/// backend-specific error shapes.
#[derive(Debug, Error)]
pub enum OrmError {
    #[error("Validation error on field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("SQL execution error: {0}")]
    Execution(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OrmError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        OrmError::Validation {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn unknown_field(field: &str, table: &str) -> Self {
        OrmError::Query(format!(
            "Field '{field}' does not exist on model '{table}'"
        ))
    }

    /// True for failures raised before any statement was sent to a database.
    #[must_use]
    pub fn is_compile_time(&self) -> bool {
        matches!(self, OrmError::Validation { .. } | OrmError::Query(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for OrmError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, detail) => {
                let detail = detail.clone().unwrap_or_else(|| failure.to_string());
                match failure.code {
                    rusqlite::ErrorCode::ConstraintViolation => {
                        OrmError::Integrity(detail)
                    }
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                        OrmError::Integrity(format!("database is busy: {detail}"))
                    }
                    _ => OrmError::Execution(detail),
                }
            }
            _ => OrmError::Execution(err.to_string()),
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    fn failure(code: rusqlite::ErrorCode, extended: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code: extended,
            },
            Some("UNIQUE constraint failed: items.name".into()),
        )
    }

    #[test]
    fn constraint_failures_become_integrity_errors() {
        let err: OrmError = failure(rusqlite::ErrorCode::ConstraintViolation, 2067).into();
        assert!(matches!(err, OrmError::Integrity(ref msg) if msg.contains("items.name")));
    }

    #[test]
    fn busy_is_integrity_class() {
        let err: OrmError = failure(rusqlite::ErrorCode::DatabaseBusy, 5).into();
        assert!(matches!(err, OrmError::Integrity(ref msg) if msg.starts_with("database is busy")));
    }

    #[test]
    fn other_engine_errors_are_execution_errors() {
        let err: OrmError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, OrmError::Execution(_)));
        assert!(!err.is_compile_time());
    }
}
