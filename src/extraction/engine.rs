//! Pattern extraction engine.
//!
//! Each field is read from the message text with its template pattern.
//! Matching runs on the blocking pool under a timeout. A panic inside the
//! matcher surfaces as `ExtractionError::Matcher`.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DEFAULT_MATCH_TIMEOUT_MS;
use crate::error::ExtractionError;
use crate::templates::{FieldPattern, Template, TransactionField};

/// Values read from one message. Optional fields are empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub vendor_reference_id: String,
    pub amount: String,
    pub date: String,
    pub transaction_reference_id: String,
    pub account_number: String,
    pub currency: String,
}

impl ExtractedFields {
    fn set(&mut self, field: TransactionField, value: String) {
        match field {
            TransactionField::VendorReferenceId => self.vendor_reference_id = value,
            TransactionField::Amount => self.amount = value,
            TransactionField::Date => self.date = value,
            TransactionField::TransactionReferenceId => self.transaction_reference_id = value,
            TransactionField::AccountNumber => self.account_number = value,
            TransactionField::Currency => self.currency = value,
        }
    }

    pub fn get(&self, field: TransactionField) -> &str {
        match field {
            TransactionField::VendorReferenceId => &self.vendor_reference_id,
            TransactionField::Amount => &self.amount,
            TransactionField::Date => &self.date,
            TransactionField::TransactionReferenceId => &self.transaction_reference_id,
            TransactionField::AccountNumber => &self.account_number,
            TransactionField::Currency => &self.currency,
        }
    }
}

/// Runs template patterns against message text.
#[derive(Debug, Clone)]
pub struct Extractor {
    match_timeout: Duration,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_MATCH_TIMEOUT_MS))
    }
}

impl Extractor {
    pub fn new(match_timeout: Duration) -> Self {
        Self { match_timeout }
    }

    /// Extract one field.
    ///
    /// - Invalid pattern → `PatternCompile`, whatever the policy.
    /// - No match, or an empty capture → `MissingRequiredField` when
    ///   `required`, otherwise an empty string.
    /// - Timeout → `PatternTimeout` when `required`, otherwise an empty string.
    /// - Otherwise the first match's capture, verbatim.
    pub async fn extract_field(
        &self,
        text: &Arc<str>,
        pattern: &FieldPattern,
        required: bool,
    ) -> Result<String, ExtractionError> {
        let field = pattern.field();

        let Some(regex) = pattern.regex()? else {
            return apply_policy(field, None, required);
        };

        let regex = regex.clone();
        let haystack = Arc::clone(text);
        let handle =
            tokio::task::spawn_blocking(move || find_capture(&regex, &haystack, field.name()));

        self.await_match(field, required, handle).await
    }

    async fn await_match(
        &self,
        field: TransactionField,
        required: bool,
        handle: JoinHandle<Option<String>>,
    ) -> Result<String, ExtractionError> {
        match tokio::time::timeout(self.match_timeout, handle).await {
            Ok(Ok(captured)) => apply_policy(field, captured, required),
            Ok(Err(e)) => Err(ExtractionError::Matcher {
                field: field.name().to_string(),
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!(
                    field = %field,
                    timeout_ms = self.match_timeout.as_millis() as u64,
                    required,
                    "Pattern match timed out"
                );
                if required {
                    Err(ExtractionError::PatternTimeout {
                        field: field.name().to_string(),
                        timeout: self.match_timeout,
                    })
                } else {
                    Ok(String::new())
                }
            }
        }
    }

    /// Extract all six fields in the fixed order, stopping at the first
    /// failure. Nothing extracted before the failure is returned.
    pub async fn extract_transaction(
        &self,
        text: &str,
        template: &Template,
    ) -> Result<ExtractedFields, ExtractionError> {
        let text: Arc<str> = Arc::from(text);
        let mut fields = ExtractedFields::default();

        for field in TransactionField::EXTRACTION_ORDER {
            let value = self
                .extract_field(&text, template.pattern(field), field.is_required())
                .await?;
            debug!(
                template = %template.name(),
                field = %field,
                matched = !value.is_empty(),
                "Field extracted"
            );
            fields.set(field, value);
        }

        Ok(fields)
    }
}

/// First match of `regex` in `text`, returning the named group if it took part.
fn find_capture(regex: &Regex, text: &str, name: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.name(name))
        .map(|m| m.as_str().to_string())
}

fn apply_policy(
    field: TransactionField,
    captured: Option<String>,
    required: bool,
) -> Result<String, ExtractionError> {
    match captured {
        Some(value) if !value.is_empty() => Ok(value),
        _ if required => Err(ExtractionError::MissingRequiredField {
            field: field.name().to_string(),
        }),
        _ => Ok(String::new()),
    }
}
