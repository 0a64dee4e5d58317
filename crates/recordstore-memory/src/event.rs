//! Recorded connection activity.

/// Kind of a recorded statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// SELECT.
    Select,
    /// SELECT COUNT(*).
    Count,
    /// INSERT.
    Insert,
    /// UPDATE.
    Update,
    /// DELETE.
    Delete,
}

/// One thing the connection was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// BEGIN.
    Begin,
    /// COMMIT, whether or not it succeeded.
    Commit,
    /// ROLLBACK, whether or not it succeeded.
    Rollback,
    /// A statement, recorded before it runs.
    Statement {
        /// Statement kind.
        kind: StatementKind,
        /// Target table.
        table: String,
        /// Rendered SQL.
        sql: String,
    },
}

impl Event {
    /// The statement kind, for statement events.
    pub fn statement_kind(&self) -> Option<StatementKind> {
        match self {
            Event::Statement { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The target table, for statement events.
    pub fn table(&self) -> Option<&str> {
        match self {
            Event::Statement { table, .. } => Some(table),
            _ => None,
        }
    }
}
