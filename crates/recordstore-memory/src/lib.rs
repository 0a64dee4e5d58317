//! In-memory connection for recordstore.
//!
//! [`MemoryConnection`] implements the [`Connection`](recordstore_query::Connection)
//! capability by evaluating statements directly against tables held in
//! memory. It understands every predicate the query layer can build
//! (including left joins, JSON and array operators), supports one level of
//! snapshot transactions, records every statement it receives and can be
//! told to fail commits, rollbacks or writes.
//!
//! # Example
//!
//! ```ignore
//! let conn = MemoryConnection::with_schema(&schema);
//! let store = Store::<Person, _>::new(&conn, Arc::clone(&schema))?;
//! store.insert(&mut person)?;
//! assert_eq!(conn.statement_count(StatementKind::Insert), 1);
//! ```

mod connection;
mod eval;
pub mod event;

pub use connection::{MemoryConnection, MemoryCursor};
pub use event::{Event, StatementKind};
