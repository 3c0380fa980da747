//! Field extraction from message text.

pub mod engine;

pub use engine::{ExtractedFields, Extractor};
