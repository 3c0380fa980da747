//! Persistence layer: SQLite-backed storage for audit records, transactions
//! and notification attempts.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
