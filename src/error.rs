//! Error types for the transaction relay.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Field extraction errors.
///
/// A timeout is reported separately from a plain non-match so that it can be
/// logged distinctly, even though both follow the same required/optional policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("pattern for field {field} does not compile: {reason}")]
    PatternCompile { field: String, reason: String },

    #[error("pattern for field {field} timed out after {timeout:?}")]
    PatternTimeout { field: String, timeout: Duration },

    #[error("missing required field {field}")]
    MissingRequiredField { field: String },

    #[error("matcher for field {field} failed: {reason}")]
    Matcher { field: String, reason: String },
}

/// Callback delivery errors.
///
/// The `Display` output is what ends up in `NotificationRecord::status_text`.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failure serializing request data {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failure creating request {0}")]
    Request(String),

    #[error("failure sending request to {url}. {reason}")]
    Send { url: String, reason: String },

    #[error("server returned {code}")]
    Status { code: u16, response_text: String },
}

/// Inbound transport errors. Only raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid listen address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Server failed: {0}")]
    Serve(std::io::Error),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
