//! recordstore: a typesafe data-mapping layer for relational stores.
//!
//! Describe each application type once with a [`ModelDescriptor`], implement
//! the [`Record`] capability for it (by hand or from generated code), and
//! a [`Store`] handles the rest: inserting, updating and deleting records
//! together with their related records, running lifecycle hooks, promoting
//! writes to transactions, and querying with lazily loaded relationships.
//!
//! # Crates
//!
//! - `recordstore-core` - values, errors, schema metadata, the record capability
//! - `recordstore-query` - predicates, the query builder, statements, the connection traits
//! - `recordstore-store` - stores, result sets and batched relationship loading
//! - `recordstore-memory` (feature `memory`) - an in-memory connection
//!
//! # Example
//!
//! ```ignore
//! use recordstore::prelude::*;
//!
//! let schema = Arc::new(
//!     Schema::builder()
//!         .model(
//!             ModelDescriptor::builder("Person")
//!                 .field(FieldDescriptor::scalar("id", SqlType::BigInt).primary_key().auto_increment())
//!                 .field(FieldDescriptor::scalar("name", SqlType::Text))
//!                 .relationship(RelationshipDescriptor::one_to_many("pets", "Pet")),
//!         )
//!         .model(/* Pet */)
//!         .build()?,
//! );
//!
//! let store = Store::<Person, _>::new(&conn, Arc::clone(&schema))?;
//! let mut people = store.find(
//!     Query::new()
//!         .filter(Expr::col("name").like("A%"))
//!         .with_relation("pets", None)
//!         .batch_size(100),
//! )?;
//! while people.advance()? {
//!     let person = people.current()?;
//!     println!("{} has {} pets", person.name, person.pets.len());
//! }
//! ```

pub use recordstore_core::{
    ColumnDescriptor, ColumnKind, ColumnSet, Direction, Error, FieldDescriptor, FieldKind,
    FromValue, Hook, HookFailure, HookSet, Model, ModelBuilder, ModelDescriptor,
    NotWritableReason, PrimaryKeyDescriptor, Record, RecordState, Related, RelatedMany,
    RelationSlot, RelationshipDescriptor, RelationshipKind, Result, Row, Schema, SchemaBuilder,
    SqlType, TransactionError, Value, unknown_column,
};
pub use recordstore_query::{
    ArrayOp, BatchedRelation, Column, CompareOp, Connection, Count, Cursor, Delete, Expr, Include,
    Insert, Join, JoinedRelation, JsonOp, OrderBy, Projection, Query, Select, SelectPlan,
    SortOrder, Statement, Update,
};
pub use recordstore_store::{ResultSet, SaveOutcome, Store, StoreConfig, run_in_transaction};

#[cfg(feature = "memory")]
pub use recordstore_memory::{Event, MemoryConnection, MemoryCursor, StatementKind};

/// Everything needed to declare models and use stores.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        Connection, Error, Expr, FieldDescriptor, Hook, HookFailure, HookSet, Model,
        ModelDescriptor, NotWritableReason, OrderBy, Query, Record, RecordState, Related,
        RelatedMany, RelationSlot, RelationshipDescriptor, Result, SaveOutcome, Schema, SqlType,
        Store, StoreConfig, Value, unknown_column,
    };
}
