//! Connection-level transaction state.
//!
//! The tracker mirrors what the engine is doing so the shim can refuse
//! nonsensical sequences (a second `BEGIN`, a `COMMIT` with nothing open)
//! with a `TransactionError` before they reach the engine. Transitions are
//! checked first and applied only after the engine accepted the statement.

use std::fmt;

use crate::error::OrmError;
use crate::statement::TxControl;

/// Whether statements currently run in autocommit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// Each statement commits on its own.
    #[default]
    Auto,
    /// Writes stay pending until an explicit commit or rollback.
    Explicit,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Auto => f.write_str("AUTO"),
            TransactionState::Explicit => f.write_str("EXPLICIT"),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TransactionTracker {
    state: TransactionState,
    savepoints: Vec<String>,
    opened_by_savepoint: bool,
}

impl TransactionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn is_explicit(&self) -> bool {
        self.state == TransactionState::Explicit
    }

    /// Names of open savepoints, innermost last.
    #[must_use]
    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    /// Check that `control` is legal in the current state.
    ///
    /// Only savepoints nest; `BEGIN` inside an open transaction is refused.
    ///
    /// # Errors
    /// Returns `OrmError::Transaction` describing the illegal transition.
    pub fn check(&self, control: &TxControl) -> Result<(), OrmError> {
        match (self.state, control) {
            (TransactionState::Explicit, TxControl::Begin) => Err(OrmError::Transaction(
                "cannot BEGIN: a transaction is already active".into(),
            )),
            (TransactionState::Auto, TxControl::Commit) => Err(OrmError::Transaction(
                "cannot COMMIT: no transaction is active".into(),
            )),
            (TransactionState::Auto, TxControl::Rollback) => Err(OrmError::Transaction(
                "cannot ROLLBACK: no transaction is active".into(),
            )),
            (_, TxControl::Release(name) | TxControl::RollbackTo(name))
                if !self.has_savepoint(name) =>
            {
                Err(OrmError::Transaction(format!("no such savepoint: {name}")))
            }
            _ => Ok(()),
        }
    }

    /// Record a transition the engine has accepted.
    pub fn apply(&mut self, control: &TxControl) {
        match control {
            TxControl::Begin => {
                self.state = TransactionState::Explicit;
                self.opened_by_savepoint = false;
            }
            TxControl::Commit | TxControl::Rollback => self.reset(),
            TxControl::Savepoint(name) => {
                if self.state == TransactionState::Auto {
                    self.state = TransactionState::Explicit;
                    self.opened_by_savepoint = true;
                }
                self.savepoints.push(name.clone());
            }
            TxControl::Release(name) => {
                if let Some(idx) = self.find_savepoint(name) {
                    self.savepoints.truncate(idx);
                }
                if self.savepoints.is_empty() && self.opened_by_savepoint {
                    self.reset();
                }
            }
            TxControl::RollbackTo(name) => {
                if let Some(idx) = self.find_savepoint(name) {
                    self.savepoints.truncate(idx + 1);
                }
            }
        }
    }

    /// Return to autocommit, dropping any savepoints.
    pub fn reset(&mut self) {
        self.state = TransactionState::Auto;
        self.savepoints.clear();
        self.opened_by_savepoint = false;
    }

    fn has_savepoint(&self, name: &str) -> bool {
        self.find_savepoint(name).is_some()
    }

    fn find_savepoint(&self, name: &str) -> Option<usize> {
        self.savepoints
            .iter()
            .rposition(|sp| sp.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(tracker: &mut TransactionTracker, control: &TxControl) -> Result<(), OrmError> {
        tracker.check(control)?;
        tracker.apply(control);
        Ok(())
    }

    #[test]
    fn begin_commit_cycle() {
        let mut tracker = TransactionTracker::new();
        assert_eq!(tracker.state(), TransactionState::Auto);
        step(&mut tracker, &TxControl::Begin).unwrap();
        assert_eq!(tracker.state(), TransactionState::Explicit);
        step(&mut tracker, &TxControl::Commit).unwrap();
        assert_eq!(tracker.state(), TransactionState::Auto);
    }

    #[test]
    fn illegal_transitions_are_rejected_without_changing_state() {
        let mut tracker = TransactionTracker::new();
        assert!(matches!(step(&mut tracker, &TxControl::Commit), Err(OrmError::Transaction(_))));
        assert!(matches!(step(&mut tracker, &TxControl::Rollback), Err(OrmError::Transaction(_))));
        step(&mut tracker, &TxControl::Begin).unwrap();
        assert!(matches!(step(&mut tracker, &TxControl::Begin), Err(OrmError::Transaction(_))));
        assert!(tracker.is_explicit());
    }

    #[test]
    fn savepoint_opened_transaction_closes_on_last_release() {
        let mut tracker = TransactionTracker::new();
        step(&mut tracker, &TxControl::Savepoint("A".into())).unwrap();
        step(&mut tracker, &TxControl::Savepoint("B".into())).unwrap();
        assert!(tracker.is_explicit());
        step(&mut tracker, &TxControl::Release("B".into())).unwrap();
        assert!(tracker.is_explicit());
        step(&mut tracker, &TxControl::Release("A".into())).unwrap();
        assert_eq!(tracker.state(), TransactionState::Auto);
    }

    #[test]
    fn savepoints_inside_begin_keep_transaction_open() {
        let mut tracker = TransactionTracker::new();
        step(&mut tracker, &TxControl::Begin).unwrap();
        step(&mut tracker, &TxControl::Savepoint("A".into())).unwrap();
        step(&mut tracker, &TxControl::Savepoint("B".into())).unwrap();
        step(&mut tracker, &TxControl::RollbackTo("a".into())).unwrap();
        assert_eq!(tracker.savepoints(), ["A".to_owned()]);
        step(&mut tracker, &TxControl::Release("A".into())).unwrap();
        assert!(tracker.is_explicit());
        assert!(matches!(
            step(&mut tracker, &TxControl::Release("A".into())),
            Err(OrmError::Transaction(_))
        ));
        step(&mut tracker, &TxControl::Rollback).unwrap();
        assert!(tracker.savepoints().is_empty());
    }

    #[test]
    fn begin_inside_savepoint_transaction_is_refused() {
        let mut tracker = TransactionTracker::new();
        step(&mut tracker, &TxControl::Savepoint("A".into())).unwrap();
        assert!(matches!(step(&mut tracker, &TxControl::Begin), Err(OrmError::Transaction(_))));
        assert_eq!(tracker.savepoints(), ["A".to_owned()]);
        step(&mut tracker, &TxControl::Release("A".into())).unwrap();
        assert_eq!(tracker.state(), TransactionState::Auto);
    }

    #[test]
    fn state_displays_like_the_remote_store() {
        assert_eq!(TransactionState::Auto.to_string(), "AUTO");
        assert_eq!(TransactionState::Explicit.to_string(), "EXPLICIT");
    }
}
