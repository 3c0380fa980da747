//! Per-sender templates: which sender a message came from and how to read it.

pub mod model;
pub mod registry;

pub use model::{FieldPattern, Template, TransactionField};
pub use registry::TemplateRegistry;
