//! Email-specific helpers: mailbox acceptance and raw message parsing.

use std::collections::HashSet;

use mail_parser::{MessageParser, MimeHeaders};
use tracing::debug;

/// Decides which recipients this relay accepts mail for.
///
/// A recipient is accepted when its local part (everything before the first
/// `@`) names a configured mailbox, compared case-insensitively. Addresses
/// without an `@` are always rejected.
#[derive(Debug, Clone, Default)]
pub struct MailboxFilter {
    mailboxes: HashSet<String>,
}

impl MailboxFilter {
    pub fn new<I, S>(mailboxes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mailboxes = mailboxes
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        Self { mailboxes }
    }

    /// The recipient-acceptance predicate.
    pub fn accepts(&self, recipient: &str) -> bool {
        let address = recipient
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>');

        let Some((local, _domain)) = address.split_once('@') else {
            debug!(recipient, "Rejected malformed mailbox name");
            return false;
        };

        let exists = self.mailboxes.contains(&local.to_lowercase());
        debug!(recipient, mailbox = local, exists, "Mailbox lookup");
        exists
    }

    /// Keep only the recipients this relay accepts, in their original order.
    pub fn filter_recipients(&self, recipients: &[String]) -> Vec<String> {
        recipients
            .iter()
            .filter(|r| self.accepts(r))
            .cloned()
            .collect()
    }
}

/// Subject, sender and readable text of an RFC 5322 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMail {
    /// `From` header address, if any.
    pub from: Option<String>,
    pub subject: String,
    pub body: String,
}

impl ParsedMail {
    /// Parse a raw message. Returns `None` if nothing resembling a message
    /// could be read.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw.as_bytes())?;

        let from = parsed
            .from()
            .and_then(|addr| addr.first())
            .and_then(|a| a.address())
            .map(|s| s.to_string());

        Some(Self {
            from,
            subject: parsed.subject().unwrap_or_default().to_string(),
            body: extract_text(&parsed),
        })
    }
}

/// Readable text of a parsed message: the first text part, else stripped HTML,
/// else the first text attachment.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

/// Drop tags from an HTML body, keeping line structure.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── MailboxFilter tests ─────────────────────────────────────

    fn filter() -> MailboxFilter {
        MailboxFilter::new(["payments", " Alerts "])
    }

    #[test]
    fn accepts_configured_mailbox() {
        assert!(filter().accepts("payments@relay.example"));
    }

    #[test]
    fn mailbox_match_is_case_insensitive() {
        assert!(filter().accepts("PAYMENTS@relay.example"));
        assert!(filter().accepts("alerts@relay.example"));
    }

    #[test]
    fn rejects_unknown_mailbox() {
        assert!(!filter().accepts("postmaster@relay.example"));
    }

    #[test]
    fn rejects_address_without_at() {
        assert!(!filter().accepts("payments"));
        assert!(!filter().accepts(""));
    }

    #[test]
    fn accepts_angle_bracketed_address() {
        assert!(filter().accepts("<payments@relay.example>"));
    }

    #[test]
    fn empty_filter_rejects_everything() {
        let filter = MailboxFilter::new(Vec::<String>::new());
        assert!(!filter.accepts("payments@relay.example"));
    }

    #[test]
    fn filter_keeps_order_of_accepted() {
        let kept = filter().filter_recipients(&[
            "alerts@a.example".into(),
            "nobody@a.example".into(),
            "payments@b.example".into(),
        ]);
        assert_eq!(kept, vec!["alerts@a.example", "payments@b.example"]);
    }

    // ── ParsedMail tests ────────────────────────────────────────

    #[test]
    fn parses_plain_text_message() {
        let raw = "From: Bank Alerts <alerts@bank.example>\r\n\
                   To: payments@relay.example\r\n\
                   Subject: Credit alert\r\n\
                   \r\n\
                   Your account has been credited with MWK20,000.00 on 20220505.\r\n";
        let mail = ParsedMail::from_raw(raw).unwrap();
        assert_eq!(mail.from.as_deref(), Some("alerts@bank.example"));
        assert_eq!(mail.subject, "Credit alert");
        assert!(mail.body.contains("MWK20,000.00 on 20220505"));
    }

    #[test]
    fn html_only_message_is_stripped() {
        let raw = "From: alerts@bank.example\r\n\
                   Subject: Credit\r\n\
                   Content-Type: text/html; charset=utf-8\r\n\
                   \r\n\
                   <p>Amount: <b>1,000.00</b></p>\r\n";
        let mail = ParsedMail::from_raw(raw).unwrap();
        assert!(mail.body.contains("1,000.00"));
        assert!(!mail.body.contains("<p>"));
    }

    #[test]
    fn missing_subject_is_empty() {
        let raw = "From: alerts@bank.example\r\n\r\nbody only\r\n";
        let mail = ParsedMail::from_raw(raw).unwrap();
        assert_eq!(mail.subject, "");
        assert!(mail.body.contains("body only"));
    }

    #[test]
    fn strip_html_keeps_lines() {
        assert_eq!(strip_html("<p>Hello</p>\n<p>  World </p>"), "Hello\nWorld");
        assert_eq!(strip_html(""), "");
    }
}
