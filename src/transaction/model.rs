//! Transaction record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::ExtractedFields;

/// A credit transaction read from a notification message.
///
/// Only ever built from a successful extraction, so the required fields
/// (`vendor_reference_id`, `amount`, `date`) are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub template_name: String,
    pub date: String,
    pub amount: String,
    pub currency: String,
    pub account_number: String,
    pub vendor_reference_id: String,
    pub transaction_reference_id: String,
}

impl Transaction {
    /// Assemble a new transaction with a fresh id and creation time.
    pub fn new(template_name: &str, fields: ExtractedFields) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            template_name: template_name.to_string(),
            date: fields.date,
            amount: fields.amount,
            currency: fields.currency,
            account_number: fields.account_number,
            vendor_reference_id: fields.vendor_reference_id,
            transaction_reference_id: fields.transaction_reference_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_fields_and_assigns_identity() {
        let fields = ExtractedFields {
            vendor_reference_id: "VRIF0XA65FE2".into(),
            amount: "50,342.00".into(),
            date: "20210101".into(),
            transaction_reference_id: String::new(),
            account_number: "1239874".into(),
            currency: "MWK".into(),
        };
        let tx = Transaction::new("Test template", fields.clone());
        let other = Transaction::new("Test template", fields);

        assert_eq!(tx.template_name, "Test template");
        assert_eq!(tx.vendor_reference_id, "VRIF0XA65FE2");
        assert_eq!(tx.amount, "50,342.00");
        assert_eq!(tx.date, "20210101");
        assert_eq!(tx.transaction_reference_id, "");
        assert_eq!(tx.account_number, "1239874");
        assert_eq!(tx.currency, "MWK");
        assert_ne!(tx.id, other.id);
    }
}
