//! Store, result sets and relationship loading for recordstore.
//!
//! This crate turns compiled queries into records and records into
//! statements:
//!
//! - [`Store`] - per-model insert/update/save/delete/reload/find/count
//! - [`ResultSet`] - lazy iteration with batched one-to-many loading
//! - [`run_in_transaction`] - BEGIN/COMMIT/ROLLBACK around a unit of work
//! - [`StoreConfig`] - batch sizes and statement logging
//!
//! Everything is synchronous: each call blocks until the connection answers.

pub mod config;
mod loader;
pub mod result_set;
pub mod store;
pub mod transaction;

pub use config::StoreConfig;
pub use result_set::ResultSet;
pub use store::{SaveOutcome, Store};
pub use transaction::run_in_transaction;
