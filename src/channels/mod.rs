//! Inbound transport: recipient acceptance and the HTTP ingest adapter.

pub mod email_types;
pub mod http_ingest;

pub use email_types::{MailboxFilter, ParsedMail};
pub use http_ingest::{IngestState, ingest_routes};
