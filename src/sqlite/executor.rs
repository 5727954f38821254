//! Synchronous statement execution against one `SQLite` connection.
//!
//! The embedded engine has no notion of the remote store's implicit
//! per-statement commit, so every statement passes through here: control
//! statements move the [`TransactionTracker`], everything else runs and is
//! then reconciled with the tracker (committed when in AUTO, left pending
//! when EXPLICIT).

use std::time::Instant;

use rusqlite::Connection;

use crate::database::BoundStatement;
use crate::error::OrmError;
use crate::results::D1Result;
use crate::statement::{TxControl, classify, is_dml_shaped, is_insert_shaped, split_statements};
use crate::transaction::{TransactionState, TransactionTracker};
use crate::types::SqlValue;

use super::config::{ShimOptions, TransactionDetection};
use super::params::Params;
use super::query::build_result_set;

const BATCH_SAVEPOINT: &str = "d1_batch";

pub(crate) struct Engine {
    conn: Connection,
    tracker: TransactionTracker,
    detection: TransactionDetection,
}

impl Engine {
    pub(crate) fn open(options: &ShimOptions) -> Result<Self, OrmError> {
        let conn = match &options.path {
            Some(path) => Connection::open(path).map_err(|e| {
                OrmError::Connection(format!("failed to open {}: {e}", path.display()))
            })?,
            None => Connection::open_in_memory()
                .map_err(|e| OrmError::Connection(format!("failed to open in-memory database: {e}")))?,
        };
        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| OrmError::Connection(format!("failed to set busy timeout: {e}")))?;

        let mut pragmas = String::new();
        if options.foreign_keys {
            pragmas.push_str("PRAGMA foreign_keys = ON;");
        }
        if options.wal && options.path.is_some() {
            pragmas.push_str("PRAGMA journal_mode = WAL;");
        }
        if !pragmas.is_empty() {
            conn.execute_batch(&pragmas)
                .map_err(|e| OrmError::Connection(format!("failed to apply pragmas: {e}")))?;
        }

        Ok(Self {
            conn,
            tracker: TransactionTracker::new(),
            detection: options.detection,
        })
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.tracker.state()
    }

    /// Run one statement under the remote store's commit rules.
    pub(crate) fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<D1Result, OrmError> {
        if let Some(control) = classify(sql) {
            if self.detection == TransactionDetection::ExplicitOnly {
                return Err(OrmError::Transaction(format!(
                    "transaction control text is disabled; use begin()/commit()/rollback() instead of '{}'",
                    sql.trim()
                )));
            }
            return self.control(&control, sql);
        }
        let result = self.run_statement(sql, params);
        self.settle();
        result
    }

    /// Apply a transaction-control statement after checking it against the tracker.
    pub(crate) fn control(&mut self, control: &TxControl, sql: &str) -> Result<D1Result, OrmError> {
        let started = Instant::now();
        if split_statements(sql).len() > 1 {
            return Err(OrmError::Query(format!(
                "transaction control must be sent alone; use exec() for multi-statement text: '{}'",
                sql.trim()
            )));
        }
        self.tracker.check(control)?;
        if let Err(e) = self.conn.execute_batch(sql) {
            self.settle();
            return Err(e.into());
        }
        self.tracker.apply(control);
        self.settle();
        tracing::debug!(statement = sql.trim(), state = %self.tracker.state(), "transaction control");

        let mut result = D1Result::with_capacity(0);
        result.meta.set_duration(started.elapsed());
        Ok(result)
    }

    /// Split multi-statement text and run each piece through [`Engine::execute`].
    ///
    /// Metadata is summed across statements; rows are those of the last one.
    pub(crate) fn exec(&mut self, sql: &str) -> Result<D1Result, OrmError> {
        let started = Instant::now();
        let mut total = D1Result::with_capacity(0);
        for statement in split_statements(sql) {
            let result = self.execute(statement, &[])?;
            total.meta.changes += result.meta.changes;
            total.meta.rows_read += result.meta.rows_read;
            total.meta.rows_written += result.meta.rows_written;
            if result.meta.last_row_id.is_some() {
                total.meta.last_row_id = result.meta.last_row_id;
            }
            total.results = result.results;
        }
        total.meta.set_duration(started.elapsed());
        Ok(total)
    }

    /// Run statements atomically. Outside a transaction the batch gets its own;
    /// inside one it runs under a savepoint so a failure undoes only the batch.
    pub(crate) fn batch(&mut self, statements: &[BoundStatement]) -> Result<Vec<D1Result>, OrmError> {
        if let Some(stmt) = statements.iter().find(|s| classify(&s.sql).is_some()) {
            return Err(OrmError::Transaction(format!(
                "transaction control is not allowed inside a batch: '{}'",
                stmt.sql.trim()
            )));
        }

        let nested = self.tracker.is_explicit();
        let (open, close, undo) = if nested {
            (
                format!("SAVEPOINT {BATCH_SAVEPOINT}"),
                format!("RELEASE {BATCH_SAVEPOINT}"),
                format!("ROLLBACK TO {BATCH_SAVEPOINT}; RELEASE {BATCH_SAVEPOINT}"),
            )
        } else {
            ("BEGIN".to_owned(), "COMMIT".to_owned(), "ROLLBACK".to_owned())
        };

        self.conn.execute_batch(&open)?;
        let mut results = Vec::with_capacity(statements.len());
        for stmt in statements {
            match self.run_statement(&stmt.sql, &stmt.params) {
                Ok(result) => results.push(result),
                Err(e) => {
                    self.undo_batch(&undo);
                    return Err(e);
                }
            }
        }
        if let Err(e) = self.conn.execute_batch(&close) {
            self.undo_batch(&undo);
            return Err(e.into());
        }
        tracing::debug!(statements = results.len(), nested, "batch committed");
        Ok(results)
    }

    fn undo_batch(&mut self, undo: &str) {
        if let Err(e) = self.conn.execute_batch(undo) {
            tracing::warn!(error = %e, "failed to undo batch");
        }
        self.settle();
    }

    /// Execute one statement and fill in the envelope metadata.
    fn run_statement(&self, sql: &str, params: &[SqlValue]) -> Result<D1Result, OrmError> {
        let started = Instant::now();
        tracing::debug!(sql, params = params.len(), "executing statement");

        let mut stmt = self.conn.prepare(sql)?;
        let expected = stmt.parameter_count();
        if expected != params.len() {
            return Err(OrmError::Query(format!(
                "statement expects {expected} parameters but {} were bound",
                params.len()
            )));
        }
        let readonly = stmt.readonly();
        let mut result = build_result_set(&mut stmt, &Params::convert(params))?;
        drop(stmt);

        let returned = result.results.len();
        let changes = if !readonly && is_dml_shaped(sql) {
            usize::try_from(self.conn.changes()).unwrap_or(usize::MAX)
        } else {
            0
        };
        result.meta.changes = changes;
        result.meta.rows_written = changes;
        result.meta.rows_read = if readonly { returned } else { returned.max(changes) };
        if changes > 0 && is_insert_shaped(sql) {
            result.meta.last_row_id = Some(self.conn.last_insert_rowid());
        }
        result.meta.set_duration(started.elapsed());
        Ok(result)
    }

    /// Reconcile the engine's autocommit flag with the tracker.
    fn settle(&mut self) {
        let autocommit = self.conn.is_autocommit();
        match self.tracker.state() {
            TransactionState::Auto if !autocommit => {
                tracing::warn!("statement left a transaction open in AUTO mode; committing it");
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    tracing::warn!(error = %e, "implicit commit failed; rolling back");
                    if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                        tracing::warn!(error = %e, "rollback after failed implicit commit also failed");
                    }
                }
            }
            TransactionState::Explicit if autocommit => {
                tracing::warn!("engine ended the explicit transaction; tracker reset to AUTO");
                self.tracker.reset();
            }
            _ => {}
        }
    }
}
