//! Core types and traits for recordstore.
//!
//! `recordstore-core` is the **foundation layer** of the workspace. It defines
//! the schema metadata, the dynamic [`Value`] currency and the [`Record`]
//! capability every mapped type implements.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Record`] and [`Model`] are implemented by
//!   application types (by hand or by a generator) so the engine can read and
//!   write them without reflection.
//! - **Metadata**: [`Schema`], [`ModelDescriptor`], [`FieldDescriptor`] and
//!   [`RelationshipDescriptor`] describe tables, columns and relationships.
//!   A schema is validated once and shared read-only.
//! - **Data model**: [`Value`] and [`Row`] carry query inputs and outputs.
//!
//! # Who Uses This Crate
//!
//! - `recordstore-query` compiles predicates and queries against a [`Schema`].
//! - `recordstore-store` drives [`Record`] instances through their lifecycle.
//! - Drivers such as `recordstore-memory` produce [`Row`]s of [`Value`]s.
//!
//! Most applications should use the `recordstore` facade.

pub mod column_set;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod record;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod value;

pub use column_set::ColumnSet;
pub use error::{Error, HookFailure, Result, TransactionError};
pub use field::{ColumnDescriptor, ColumnKind, FieldDescriptor, FieldKind, SqlType};
pub use identifiers::{
    default_column_name, default_foreign_key, default_table_name, is_valid_identifier,
    quote_ident,
};
pub use record::{
    Hook, HookSet, Model, NotWritableReason, Record, RecordState, Related, RelatedMany,
    RelationSlot, unknown_column,
};
pub use relationship::{Direction, RelationshipDescriptor, RelationshipKind};
pub use row::Row;
pub use schema::{ModelBuilder, ModelDescriptor, PrimaryKeyDescriptor, Schema, SchemaBuilder};
pub use value::{FromValue, Value};
