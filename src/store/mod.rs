//! Persistence layer — subscriptions, the quote pool, and feedback rows.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{NewFeedback, Store};
