//! Error types for recordstore.
//!
//! One enum covers the whole engine. Variants map to the error kinds callers
//! branch on: precondition failures, not-persisted and not-writable records,
//! empty lookups, execution failures reported by the driver, lifecycle hook
//! failures, and transaction failures.

use thiserror::Error;

use crate::record::{Hook, NotWritableReason};

/// Failure reason returned by a lifecycle hook.
pub type HookFailure = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all recordstore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A write required a primary key and none (or an invalid one) was set.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Update, delete or reload on a record that was never saved.
    #[error("record of model `{model}` is not persisted")]
    NotPersisted {
        /// Model name.
        model: &'static str,
    },

    /// Write attempted on a record known to be incomplete.
    #[error("record of model `{model}` is not writable: {reason}")]
    NotWritable {
        /// Model name.
        model: &'static str,
        /// First reason the record is not writable.
        reason: NotWritableReason,
    },

    /// A single-row lookup matched nothing.
    #[error("no rows found")]
    NoRows,

    /// The execution capability reported a failure.
    #[error("execution failed: {message}")]
    Execution {
        /// Driver-supplied description.
        message: String,
        /// Underlying driver error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A lifecycle hook returned a failure.
    #[error("{hook} hook failed: {source}")]
    Hook {
        /// The hook that failed.
        hook: Hook,
        /// The reason reported by the hook.
        #[source]
        source: HookFailure,
    },

    /// Beginning, committing or rolling back a transaction failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The schema metadata is inconsistent or does not know a name.
    #[error("schema error: {0}")]
    Schema(String),

    /// A value could not be converted to or from its column type.
    #[error("decode error: {0}")]
    Decode(String),

    /// A result set was read after it was exhausted or closed.
    #[error("result set is closed")]
    Closed,
}

impl Error {
    /// Build an execution error from a message.
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution {
            message: message.into(),
            source: None,
        }
    }

    /// Build an execution error wrapping a driver error.
    pub fn execution_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Execution {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema(message.into())
    }

    /// Whether this error came from a lifecycle hook, directly or as the
    /// cause of a failed rollback.
    pub fn is_hook(&self) -> bool {
        match self {
            Error::Hook { .. } => true,
            Error::Transaction(TransactionError::Rollback { cause, .. }) => cause.is_hook(),
            _ => false,
        }
    }

    /// The error that triggered a rollback, if this error carries one.
    pub fn cause(&self) -> &Error {
        match self {
            Error::Transaction(TransactionError::Rollback { cause, .. }) => cause,
            other => other,
        }
    }
}

/// Transaction lifecycle failures.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `BEGIN` failed.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] Box<Error>),

    /// `COMMIT` failed; the driver is expected to have rolled back.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] Box<Error>),

    /// An operation failed and the rollback that followed failed as well.
    /// Both errors are kept.
    #[error("rollback failed ({rollback}) after error: {cause}")]
    Rollback {
        /// The error that triggered the rollback.
        #[source]
        cause: Box<Error>,
        /// The error reported by the rollback itself.
        rollback: Box<Error>,
    },

    /// A write failed part way inside the transaction, so it was rolled
    /// back even though the unit of work returned successfully.
    #[error("transaction rolled back: a write inside it failed")]
    RollbackOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_keeps_both_errors() {
        let err = Error::from(TransactionError::Rollback {
            cause: Box::new(Error::Hook {
                hook: Hook::AfterInsert,
                source: "boom".into(),
            }),
            rollback: Box::new(Error::execution("connection reset")),
        });
        assert!(err.is_hook());
        assert!(matches!(err.cause(), Error::Hook { .. }));
        let text = err.to_string();
        assert!(text.contains("connection reset"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_transaction_error_source_chain() {
        use std::error::Error as _;

        let err = TransactionError::Commit(Box::new(Error::execution("disk full")));
        assert_eq!(
            err.to_string(),
            "failed to commit transaction: execution failed: disk full"
        );
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("execution failed: disk full"));

        let err = TransactionError::Rollback {
            cause: Box::new(Error::NoRows),
            rollback: Box::new(Error::execution("connection reset")),
        };
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("no rows found"));
    }

    #[test]
    fn test_not_writable_message() {
        let err = Error::NotWritable {
            model: "person",
            reason: NotWritableReason::Projection,
        };
        assert_eq!(
            err.to_string(),
            "record of model `person` is not writable: loaded with a partial column projection"
        );
    }
}
