//! Transactions built from extracted fields.

pub mod model;

pub use model::Transaction;
