//! Type-safe query building for recordstore.
//!
//! `recordstore-query` sits between the metadata in `recordstore-core` and the
//! store that executes statements.
//!
//! - [`Expr`] is the predicate tree: column comparisons, patterns, set
//!   membership, array and JSON operators, combined with AND/OR/NOT.
//! - [`Query`] is the per-model builder. It compiles to a [`SelectPlan`]
//!   that lays out joined one-to-one columns and batched one-to-many loads.
//! - [`Select`], [`Insert`], [`Update`], [`Delete`] and [`Count`] form the
//!   statement IR; each renders PostgreSQL text through `build()`.
//! - [`Connection`] and [`Cursor`] are the narrow execution capability that
//!   drivers implement.

pub mod connection;
pub mod expr;
pub mod query;
pub mod statement;

pub use connection::{Connection, Cursor};
pub use expr::{ArrayOp, Column, CompareOp, Expr, JsonOp, OrderBy, SortOrder};
pub use query::{BatchedRelation, Include, JoinedRelation, Projection, Query, SelectPlan};
pub use statement::{Count, Delete, Insert, Join, Select, Statement, Update};
