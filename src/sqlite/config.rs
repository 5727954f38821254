use std::path::PathBuf;
use std::time::Duration;

use crate::error::OrmError;

use super::D1Shim;

/// How the shim decides that a statement opens or closes a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionDetection {
    /// Classify statement text (`BEGIN`, `COMMIT`, `SAVEPOINT`, ...) as the remote store does.
    #[default]
    SniffStatements,
    /// Only [`D1Shim::begin`], [`D1Shim::commit`] and [`D1Shim::rollback`]
    /// change state; transaction-control text is rejected.
    ExplicitOnly,
}

/// Options for opening a [`D1Shim`].
#[derive(Debug, Clone)]
pub struct ShimOptions {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
    /// Switch file-backed databases to WAL journaling.
    pub wal: bool,
    pub detection: TransactionDetection,
}

impl Default for ShimOptions {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
            wal: true,
            detection: TransactionDetection::default(),
        }
    }
}

impl ShimOptions {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Fluent builder for shim options.
#[derive(Debug, Clone, Default)]
pub struct ShimOptionsBuilder {
    opts: ShimOptions,
}

impl ShimOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.opts.foreign_keys = enabled;
        self
    }

    #[must_use]
    pub fn wal(mut self, enabled: bool) -> Self {
        self.opts.wal = enabled;
        self
    }

    #[must_use]
    pub fn detection(mut self, detection: TransactionDetection) -> Self {
        self.opts.detection = detection;
        self
    }

    #[must_use]
    pub fn finish(self) -> ShimOptions {
        self.opts
    }

    /// Open the shim with these options.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Connection` if the database cannot be opened or configured.
    pub async fn build(self) -> Result<D1Shim, OrmError> {
        D1Shim::open(self.finish()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_with_sniffing() {
        let opts = ShimOptions::default();
        assert!(opts.path.is_none());
        assert!(opts.foreign_keys);
        assert_eq!(opts.detection, TransactionDetection::SniffStatements);
    }

    #[test]
    fn builder_overrides() {
        let opts = ShimOptionsBuilder::new()
            .path("/tmp/shim.db")
            .busy_timeout(Duration::from_millis(250))
            .foreign_keys(false)
            .wal(false)
            .detection(TransactionDetection::ExplicitOnly)
            .finish();
        assert_eq!(opts.path.as_deref(), Some(std::path::Path::new("/tmp/shim.db")));
        assert_eq!(opts.busy_timeout, Duration::from_millis(250));
        assert!(!opts.foreign_keys && !opts.wal);
        assert_eq!(opts.detection, TransactionDetection::ExplicitOnly);
    }
}
