//! Callback payload and the persisted record of each delivery attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::transaction::Transaction;

/// Fixed status text for an accepted callback.
pub const STATUS_POSTED: &str = "Callback posted";

/// Body of the callback POST. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationPayload {
    pub created_at: DateTime<Utc>,
    pub template_name: String,
    pub date: String,
    pub amount: String,
    pub currency: String,
    pub account_number: String,
    pub vendor_reference_id: String,
    pub transaction_reference_id: String,
}

impl NotificationPayload {
    /// Derive a payload from a transaction, stamped with the current time.
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            created_at: Utc::now(),
            template_name: tx.template_name.clone(),
            date: tx.date.clone(),
            amount: tx.amount.clone(),
            currency: tx.currency.clone(),
            account_number: tx.account_number.clone(),
            vendor_reference_id: tx.vendor_reference_id.clone(),
            transaction_reference_id: tx.transaction_reference_id.clone(),
        }
    }
}

/// What happened to one POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Serialized request body; empty if serialization itself failed.
    pub payload: String,
    pub sent: bool,
    pub status_text: String,
    pub response_text: String,
}

impl DeliveryOutcome {
    pub fn delivered(payload: String) -> Self {
        Self {
            payload,
            sent: true,
            status_text: STATUS_POSTED.to_string(),
            response_text: "200 OK".to_string(),
        }
    }

    pub fn failed(payload: String, error: &DeliveryError) -> Self {
        let response_text = match error {
            DeliveryError::Status { response_text, .. } => response_text.clone(),
            _ => String::new(),
        };
        Self {
            payload,
            sent: false,
            status_text: error.to_string(),
            response_text,
        }
    }
}

/// Persisted log of a notification attempt, written whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub callback_url: String,
    pub payload: String,
    /// True only when the callback answered exactly 200.
    pub sent: bool,
    pub status_text: String,
    pub response_text: String,
    pub from_email: String,
    pub template_name: String,
}

impl NotificationRecord {
    pub fn new(
        callback_url: &str,
        from_email: &str,
        template_name: &str,
        outcome: DeliveryOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            callback_url: callback_url.to_string(),
            payload: outcome.payload,
            sent: outcome.sent,
            status_text: outcome.status_text,
            response_text: outcome.response_text,
            from_email: from_email.to_string(),
            template_name: template_name.to_string(),
        }
    }
}
