//! Transact relay: reads bank transaction notification emails, extracts the
//! transaction with per-sender patterns and forwards it to a callback.

pub mod channels;
pub mod config;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod templates;
pub mod transaction;
