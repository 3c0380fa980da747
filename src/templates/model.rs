//! Sender templates and their compiled field patterns.

use regex::{Regex, RegexBuilder};

use crate::config::TemplateConfig;
use crate::error::ExtractionError;

/// Upper bound on the compiled size of a single pattern.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

// ── Fields ──────────────────────────────────────────────────────────

/// A transaction field extracted from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionField {
    VendorReferenceId,
    Amount,
    Date,
    TransactionReferenceId,
    AccountNumber,
    Currency,
}

impl TransactionField {
    /// Extraction order. Required fields come first so a failing message
    /// is rejected before any optional pattern runs.
    pub const EXTRACTION_ORDER: [TransactionField; 6] = [
        Self::VendorReferenceId,
        Self::Amount,
        Self::Date,
        Self::TransactionReferenceId,
        Self::AccountNumber,
        Self::Currency,
    ];

    /// Capture group name the pattern must define.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VendorReferenceId => "vendorReferenceId",
            Self::Amount => "amount",
            Self::Date => "date",
            Self::TransactionReferenceId => "transactionReferenceId",
            Self::AccountNumber => "accountNumber",
            Self::Currency => "currency",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Self::VendorReferenceId | Self::Amount | Self::Date)
    }
}

impl std::fmt::Display for TransactionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Patterns ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Compiled {
    Ready(Regex),
    /// No pattern configured for this field.
    Absent,
    /// Kept so only messages for this template fail, not the whole load.
    Invalid(String),
}

/// A field pattern compiled once at load time.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    field: TransactionField,
    source: String,
    compiled: Compiled,
}

impl FieldPattern {
    /// Compile `source` for `field`.
    ///
    /// Never fails: a blank source yields an absent pattern and a malformed
    /// one is remembered as invalid. Patterns run in multi-line mode, so
    /// `^` and `$` anchor at line boundaries, CRLF included.
    pub fn compile(field: TransactionField, source: &str) -> Self {
        let compiled = if source.trim().is_empty() {
            Compiled::Absent
        } else {
            match RegexBuilder::new(source)
                .multi_line(true)
                .crlf(true)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()
            {
                Ok(regex) => {
                    if regex.capture_names().flatten().any(|n| n == field.name()) {
                        Compiled::Ready(regex)
                    } else {
                        Compiled::Invalid(format!(
                            "pattern must contain named capture group '?P<{}>'",
                            field.name()
                        ))
                    }
                }
                Err(e) => Compiled::Invalid(e.to_string()),
            }
        };

        Self {
            field,
            source: source.to_string(),
            compiled,
        }
    }

    pub fn field(&self) -> TransactionField {
        self.field
    }

    /// Pattern text as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The compiled regex, `None` when no pattern is configured.
    pub fn regex(&self) -> Result<Option<&Regex>, ExtractionError> {
        match &self.compiled {
            Compiled::Ready(regex) => Ok(Some(regex)),
            Compiled::Absent => Ok(None),
            Compiled::Invalid(reason) => Err(ExtractionError::PatternCompile {
                field: self.field.name().to_string(),
                reason: reason.clone(),
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self.compiled, Compiled::Invalid(_))
    }
}

// ── Template ────────────────────────────────────────────────────────

/// How to recognize and parse one sender's notification format.
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Template {
    sender_email: String,
    name: String,
    date: FieldPattern,
    amount: FieldPattern,
    currency: FieldPattern,
    account_number: FieldPattern,
    vendor_reference_id: FieldPattern,
    transaction_reference_id: FieldPattern,
}

impl Template {
    pub fn from_config(config: &TemplateConfig) -> Self {
        use TransactionField::*;

        Self {
            sender_email: config.email.trim().to_string(),
            name: config.name.clone(),
            date: FieldPattern::compile(Date, &config.date_pattern),
            amount: FieldPattern::compile(Amount, &config.amount_pattern),
            currency: FieldPattern::compile(Currency, &config.currency_pattern),
            account_number: FieldPattern::compile(AccountNumber, &config.account_number_pattern),
            vendor_reference_id: FieldPattern::compile(
                VendorReferenceId,
                &config.vendor_reference_id_pattern,
            ),
            transaction_reference_id: FieldPattern::compile(
                TransactionReferenceId,
                &config.transaction_reference_id_pattern,
            ),
        }
    }

    pub fn sender_email(&self) -> &str {
        &self.sender_email
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self, field: TransactionField) -> &FieldPattern {
        match field {
            TransactionField::Date => &self.date,
            TransactionField::Amount => &self.amount,
            TransactionField::Currency => &self.currency,
            TransactionField::AccountNumber => &self.account_number,
            TransactionField::VendorReferenceId => &self.vendor_reference_id,
            TransactionField::TransactionReferenceId => &self.transaction_reference_id,
        }
    }

    /// Patterns that failed to compile, in extraction order.
    pub fn invalid_patterns(&self) -> Vec<&FieldPattern> {
        TransactionField::EXTRACTION_ORDER
            .iter()
            .map(|f| self.pattern(*f))
            .filter(|p| !p.is_valid())
            .collect()
    }

    /// Case-insensitive exact comparison against the sender address.
    pub fn matches_sender(&self, sender: &str) -> bool {
        self.sender_email.to_lowercase() == sender.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(email: &str) -> TemplateConfig {
        TemplateConfig {
            email: email.into(),
            name: "National Bank".into(),
            date_pattern: "on (?P<date>[0-9]{8})".into(),
            amount_pattern: "(?P<amount>[0-9,.]{3,18}) on ".into(),
            currency_pattern: String::new(),
            account_number_pattern: "account number (?P<accountNumber>[0-9]+)".into(),
            vendor_reference_id_pattern: "(?P<vendorReferenceId>[".into(),
            transaction_reference_id_pattern: "Reference: (?P<wrongName>FT[0-9A-Z]+)".into(),
        }
    }

    #[test]
    fn required_fields_lead_extraction_order() {
        let order = TransactionField::EXTRACTION_ORDER;
        assert!(order[..3].iter().all(|f| f.is_required()));
        assert!(order[3..].iter().all(|f| !f.is_required()));
        assert_eq!(order[0], TransactionField::VendorReferenceId);
        assert_eq!(order[5], TransactionField::Currency);
    }

    #[test]
    fn valid_pattern_compiles() {
        let pattern = FieldPattern::compile(TransactionField::Date, "on (?P<date>[0-9]{8})");
        assert!(pattern.is_valid());
        assert!(pattern.regex().unwrap().is_some());
        assert_eq!(pattern.source(), "on (?P<date>[0-9]{8})");
    }

    #[test]
    fn line_anchors_work_with_crlf() {
        let pattern = FieldPattern::compile(
            TransactionField::VendorReferenceId,
            r"^Description: (?P<vendorReferenceId>[0-9A-Z]+)\.$",
        );
        let regex = pattern.regex().unwrap().unwrap();
        let caps = regex
            .captures("Dear customer,\r\nDescription: 98324HAZ.\r\nThanks")
            .unwrap();
        assert_eq!(&caps["vendorReferenceId"], "98324HAZ");
    }

    #[test]
    fn blank_pattern_is_absent_not_invalid() {
        let pattern = FieldPattern::compile(TransactionField::Currency, "  ");
        assert!(pattern.is_valid());
        assert!(pattern.regex().unwrap().is_none());
    }

    #[test]
    fn malformed_pattern_is_kept_as_invalid() {
        let pattern = FieldPattern::compile(TransactionField::Amount, "(?P<amount>[0-9");
        assert!(!pattern.is_valid());
        assert!(matches!(
            pattern.regex(),
            Err(ExtractionError::PatternCompile { .. })
        ));
    }

    #[test]
    fn pattern_without_named_group_is_invalid() {
        let pattern = FieldPattern::compile(TransactionField::Amount, "([0-9]+)");
        match pattern.regex() {
            Err(ExtractionError::PatternCompile { field, reason }) => {
                assert_eq!(field, "amount");
                assert!(reason.contains("?P<amount>"));
            }
            other => panic!("expected compile error, got {:?}", other),
        }
    }

    #[test]
    fn template_lists_invalid_patterns() {
        let template = Template::from_config(&config("alerts@bank.example"));
        let invalid: Vec<_> = template
            .invalid_patterns()
            .iter()
            .map(|p| p.field())
            .collect();
        assert_eq!(
            invalid,
            vec![
                TransactionField::VendorReferenceId,
                TransactionField::TransactionReferenceId
            ]
        );
    }

    #[test]
    fn sender_match_is_case_insensitive_and_exact() {
        let template = Template::from_config(&config("Alerts@Bank.example"));
        assert!(template.matches_sender("alerts@bank.EXAMPLE"));
        assert!(!template.matches_sender("alerts@bank.example.org"));
        assert!(!template.matches_sender("x-alerts@bank.example"));
    }
}
