use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::database::{BoundStatement, D1Database};
use crate::error::OrmError;
use crate::results::D1Result;
use crate::statement::TxControl;
use crate::transaction::TransactionState;
use crate::types::SqlValue;

use super::config::{ShimOptions, ShimOptionsBuilder};
use super::executor::Engine;

type SharedEngine = Arc<Mutex<Engine>>;

/// Local stand-in for the remote store, backed by one embedded `SQLite` connection.
///
/// Statements run on the blocking pool while holding the connection lock,
/// so calls through one shim (or its clones) are serialized. An explicit
/// transaction left open by an abandoned call stays open until a later
/// `commit` or `rollback`.
#[derive(Clone)]
pub struct D1Shim {
    engine: SharedEngine,
}

impl D1Shim {
    #[must_use]
    pub fn builder() -> ShimOptionsBuilder {
        ShimOptionsBuilder::new()
    }

    /// Open a shim with the given options.
    ///
    /// # Errors
    /// Returns `OrmError::Connection` if the database cannot be opened or configured.
    pub async fn open(options: ShimOptions) -> Result<Self, OrmError> {
        let engine = tokio::task::spawn_blocking(move || Engine::open(&options))
            .await
            .map_err(|e| OrmError::Connection(format!("sqlite spawn_blocking join error: {e}")))??;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
        })
    }

    /// Open a private in-memory database with default options.
    ///
    /// # Errors
    /// Returns `OrmError::Connection` if the engine cannot be initialized.
    pub async fn in_memory() -> Result<Self, OrmError> {
        Self::open(ShimOptions::in_memory()).await
    }

    /// Current transaction mode of the connection.
    pub async fn transaction_state(&self) -> TransactionState {
        self.engine.lock().await.state()
    }

    /// Open an explicit transaction.
    ///
    /// # Errors
    /// Returns `OrmError::Transaction` if one is already open.
    pub async fn begin(&self) -> Result<(), OrmError> {
        self.control(TxControl::Begin, "BEGIN").await
    }

    /// # Errors
    /// Returns `OrmError::Transaction` if no transaction is open.
    pub async fn commit(&self) -> Result<(), OrmError> {
        self.control(TxControl::Commit, "COMMIT").await
    }

    /// # Errors
    /// Returns `OrmError::Transaction` if no transaction is open.
    pub async fn rollback(&self) -> Result<(), OrmError> {
        self.control(TxControl::Rollback, "ROLLBACK").await
    }

    async fn control(&self, control: TxControl, sql: &'static str) -> Result<(), OrmError> {
        run_blocking(Arc::clone(&self.engine), move |engine| {
            engine.control(&control, sql).map(|_| ())
        })
        .await
    }
}

impl fmt::Debug for D1Shim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D1Shim").finish_non_exhaustive()
    }
}

#[async_trait]
impl D1Database for D1Shim {
    async fn all(&self, sql: &str, params: &[SqlValue]) -> Result<D1Result, OrmError> {
        let sql_owned = sql.to_owned();
        let params_owned = params.to_vec();
        run_blocking(Arc::clone(&self.engine), move |engine| {
            engine.execute(&sql_owned, &params_owned)
        })
        .await
    }

    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<D1Result, OrmError> {
        self.all(sql, params).await
    }

    async fn exec(&self, sql: &str) -> Result<D1Result, OrmError> {
        let sql_owned = sql.to_owned();
        run_blocking(Arc::clone(&self.engine), move |engine| engine.exec(&sql_owned)).await
    }

    async fn batch(&self, statements: Vec<BoundStatement>) -> Result<Vec<D1Result>, OrmError> {
        run_blocking(Arc::clone(&self.engine), move |engine| engine.batch(&statements)).await
    }
}

async fn run_blocking<F, R>(engine: SharedEngine, func: F) -> Result<R, OrmError>
where
    F: FnOnce(&mut Engine) -> Result<R, OrmError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = engine.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| OrmError::Execution(format!("sqlite spawn_blocking join error: {e}")))?
}
