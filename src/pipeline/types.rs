//! Shared types for the message processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Inbound message ─────────────────────────────────────────────────

/// A message handed over by the transport boundary.
///
/// Recipients have already passed the mailbox filter by the time a message
/// reaches the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Network address of the peer that delivered the message.
    pub source_address: String,
    /// Envelope sender.
    pub sender_email: String,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Plain-text body the templates are matched against.
    pub body: String,
}

// ── Audit records ───────────────────────────────────────────────────

/// A message from a sender with no configured template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnclassifiedMessage {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub source_address: String,
    pub subject: String,
    pub sender_email: String,
}

impl UnclassifiedMessage {
    pub fn from_inbound(message: &InboundMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            body: message.body.clone(),
            source_address: message.source_address.clone(),
            subject: message.subject.clone(),
            sender_email: message.sender_email.clone(),
        }
    }
}

/// Audit copy of a message whose sender matched a template.
///
/// Written before any extraction is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransactionEmail {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub source_address: String,
    pub subject: String,
    pub sender_email: String,
    pub recipients: Vec<String>,
}

impl RawTransactionEmail {
    pub fn from_inbound(message: &InboundMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            body: message.body.clone(),
            source_address: message.source_address.clone(),
            subject: message.subject.clone(),
            sender_email: message.sender_email.clone(),
            recipients: message.recipients.clone(),
        }
    }
}
