//! The execution capability.
//!
//! The engine never talks to a database directly. It hands statements to a
//! [`Connection`] and reads rows back through a [`Cursor`]. All methods take
//! `&self` so a live cursor can stay open while the relationship loader issues
//! its batched child queries on the same connection.
//!
//! Every method blocks the calling thread until the store answers.

use recordstore_core::{Result, Row, Value};

use crate::statement::{Count, Insert, Select, Statement};

/// A forward-only cursor over the rows of one SELECT.
pub trait Cursor {
    /// Fetch the next row, or `None` when the result is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Release the cursor. Must be safe to call more than once.
    fn close(&mut self);
}

/// A connection capable of executing recordstore statements.
///
/// Implementations own transaction state: after [`Connection::begin`] every
/// statement runs inside the transaction until [`Connection::commit`] or
/// [`Connection::rollback`].
pub trait Connection {
    /// Cursor type returned by [`Connection::query`].
    type Cursor<'c>: Cursor
    where
        Self: 'c;

    /// Run a SELECT and return a cursor over its rows.
    fn query(&self, select: &Select) -> Result<Self::Cursor<'_>>;

    /// Run a `SELECT COUNT(*)`.
    fn count(&self, count: &Count) -> Result<u64>;

    /// Run an INSERT. Returns the generated value of the `returning` column
    /// when one was requested.
    fn insert(&self, insert: &Insert) -> Result<Option<Value>>;

    /// Run an UPDATE or DELETE (or an INSERT without RETURNING) and return
    /// the number of affected rows.
    fn execute(&self, statement: &Statement) -> Result<u64>;

    /// Begin a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the current transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&self) -> Result<()>;
}
