//! Transaction scope handling.
//!
//! [`run_in_transaction`] wraps one unit of work in BEGIN/COMMIT. Any error
//! from the work triggers a rollback before the error is returned; a failed
//! rollback is reported together with the error that caused it.
//!
//! Stores bound to an open transaction share a [`TransactionScope`]. A write
//! that fails part way marks the scope rollback-only, and the scope then
//! rolls back instead of committing even if the unit of work swallowed the
//! error.

use std::sync::atomic::{AtomicBool, Ordering};

use recordstore_core::{Error, Result, TransactionError};
use recordstore_query::Connection;

/// State shared by every store working inside one open transaction.
#[derive(Debug, Default)]
pub(crate) struct TransactionScope {
    rollback_only: AtomicBool,
}

impl TransactionScope {
    /// Force the transaction to roll back when the unit of work ends.
    pub(crate) fn mark_rollback_only(&self) {
        if !self.rollback_only.swap(true, Ordering::Relaxed) {
            tracing::warn!("Transaction marked rollback-only");
        }
    }

    pub(crate) fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::Relaxed)
    }
}

/// Run `work` inside a new transaction on `conn`.
pub fn run_in_transaction<C, T>(conn: &C, work: impl FnOnce() -> Result<T>) -> Result<T>
where
    C: Connection + ?Sized,
{
    run_in_scope(conn, &TransactionScope::default(), work)
}

/// Run `work` inside a new transaction governed by `scope`.
pub(crate) fn run_in_scope<C, T>(
    conn: &C,
    scope: &TransactionScope,
    work: impl FnOnce() -> Result<T>,
) -> Result<T>
where
    C: Connection + ?Sized,
{
    tracing::info!("Beginning transaction");
    conn.begin()
        .map_err(|e| TransactionError::Begin(Box::new(e)))?;

    match work() {
        Ok(_) if scope.is_rollback_only() => {
            rollback(conn, TransactionError::RollbackOnly.into())
        }
        Ok(value) => {
            tracing::info!("Committing transaction");
            conn.commit()
                .map_err(|e| TransactionError::Commit(Box::new(e)))?;
            Ok(value)
        }
        Err(cause) => rollback(conn, cause),
    }
}

fn rollback<C, T>(conn: &C, cause: Error) -> Result<T>
where
    C: Connection + ?Sized,
{
    tracing::warn!(error = %cause, "Rolling back transaction");
    match conn.rollback() {
        Ok(()) => Err(cause),
        Err(rollback) => {
            tracing::error!(error = %rollback, "Rollback failed");
            Err(Error::from(TransactionError::Rollback {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use recordstore_core::{Row, Value};
    use recordstore_query::{Count, Cursor, Insert, Select, Statement};

    use super::*;

    struct NoRows;

    impl Cursor for NoRows {
        fn next_row(&mut self) -> Result<Option<Row>> {
            Ok(None)
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<&'static str>>,
        fail_commit: bool,
        fail_rollback: bool,
    }

    impl Connection for Recorder {
        type Cursor<'c>
            = NoRows
        where
            Self: 'c;

        fn query(&self, _select: &Select) -> Result<NoRows> {
            Ok(NoRows)
        }

        fn count(&self, _count: &Count) -> Result<u64> {
            Ok(0)
        }

        fn insert(&self, _insert: &Insert) -> Result<Option<Value>> {
            Ok(None)
        }

        fn execute(&self, _statement: &Statement) -> Result<u64> {
            Ok(0)
        }

        fn begin(&self) -> Result<()> {
            self.log.borrow_mut().push("begin");
            Ok(())
        }

        fn commit(&self) -> Result<()> {
            self.log.borrow_mut().push("commit");
            if self.fail_commit {
                return Err(Error::execution("disk full"));
            }
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            self.log.borrow_mut().push("rollback");
            if self.fail_rollback {
                return Err(Error::execution("connection reset"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_commit_on_success() {
        let conn = Recorder::default();
        let value = run_in_transaction(&conn, || Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(*conn.log.borrow(), ["begin", "commit"]);
    }

    #[test]
    fn test_rollback_returns_original_error() {
        let conn = Recorder::default();
        let err = run_in_transaction(&conn, || -> Result<()> { Err(Error::NoRows) }).unwrap_err();
        assert!(matches!(err, Error::NoRows));
        assert_eq!(*conn.log.borrow(), ["begin", "rollback"]);
    }

    #[test]
    fn test_failed_rollback_reports_both_errors() {
        let conn = Recorder {
            fail_rollback: true,
            ..Recorder::default()
        };
        let err = run_in_transaction(&conn, || -> Result<()> { Err(Error::NoRows) }).unwrap_err();
        match &err {
            Error::Transaction(TransactionError::Rollback { cause, rollback }) => {
                assert!(matches!(**cause, Error::NoRows));
                assert!(rollback.to_string().contains("connection reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rollback_only_scope_discards_successful_work() {
        let conn = Recorder::default();
        let scope = TransactionScope::default();
        let err = run_in_scope(&conn, &scope, || {
            scope.mark_rollback_only();
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError::RollbackOnly)
        ));
        assert_eq!(*conn.log.borrow(), ["begin", "rollback"]);
    }

    #[test]
    fn test_commit_failure() {
        let conn = Recorder {
            fail_commit: true,
            ..Recorder::default()
        };
        let err = run_in_transaction(&conn, || Ok(())).unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError::Commit(_))
        ));
    }
}
