//! Message processing pipeline.
//!
//! Every accepted message flows through:
//! 1. `MessageDispatcher::handle_inbound_message()`: spawn a bounded task
//! 2. `Pipeline::run()`: resolve template, audit, extract, persist, notify
//!
//! Each message is processed independently of any other in flight.

pub mod dispatcher;
pub mod orchestrator;
pub mod state;
pub mod types;

pub use dispatcher::MessageDispatcher;
pub use orchestrator::Pipeline;
pub use state::PipelineState;
pub use types::InboundMessage;
