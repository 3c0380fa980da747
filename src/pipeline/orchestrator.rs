//! Pipeline orchestrator: resolve template, audit, extract, persist, notify.
//!
//! Every step after the audit write is best effort. Storage failures are
//! logged and the message keeps moving; only an extraction failure stops it
//! before a notification is attempted.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::CallbackConfig;
use crate::extraction::Extractor;
use crate::notify::{CallbackForwarder, NotificationPayload, NotificationRecord};
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::{InboundMessage, RawTransactionEmail, UnclassifiedMessage};
use crate::store::Database;
use crate::templates::{Template, TemplateRegistry};
use crate::transaction::Transaction;

/// Runs one inbound message through the whole pipeline.
///
/// Shared behind an `Arc` by every in-flight task; holds no per-message state.
pub struct Pipeline {
    registry: Arc<TemplateRegistry>,
    extractor: Extractor,
    store: Arc<dyn Database>,
    forwarder: CallbackForwarder,
    callback: CallbackConfig,
}

impl Pipeline {
    pub fn new(
        registry: Arc<TemplateRegistry>,
        extractor: Extractor,
        store: Arc<dyn Database>,
        forwarder: CallbackForwarder,
        callback: CallbackConfig,
    ) -> Self {
        Self {
            registry,
            extractor,
            store,
            forwarder,
            callback,
        }
    }

    /// Process a message to a terminal state and return that state.
    pub async fn run(&self, message: InboundMessage) -> PipelineState {
        let mut state = PipelineState::Received;
        debug!(
            sender = %message.sender_email,
            source = %message.source_address,
            "Got message"
        );

        let Some(template) = self.registry.resolve(&message.sender_email) else {
            warn!(
                sender = %message.sender_email,
                "Sender did not match any template, storing as unclassified"
            );
            self.record_unclassified(&message).await;
            advance(&mut state, PipelineState::SpamRecorded);
            return state;
        };

        self.record_raw_email(&message, template).await;
        advance(&mut state, PipelineState::Audited);

        advance(&mut state, PipelineState::Extracting);
        let fields = match self
            .extractor
            .extract_transaction(&message.body, template)
            .await
        {
            Ok(fields) => fields,
            Err(e) => {
                error!(
                    sender = %message.sender_email,
                    template = %template.name(),
                    error = %e,
                    "Failed to parse transaction"
                );
                advance(&mut state, PipelineState::ExtractFailed);
                return state;
            }
        };

        let tx = Transaction::new(template.name(), fields);
        advance(&mut state, PipelineState::PersistTransaction);
        if let Err(e) = self.store.insert_transaction(&tx).await {
            error!(id = %tx.id, error = %e, "Failed to save transaction");
        }

        advance(&mut state, PipelineState::Notify);
        self.notify(&message, template, &tx).await;

        advance(&mut state, PipelineState::Done);
        state
    }

    async fn record_unclassified(&self, message: &InboundMessage) {
        let record = UnclassifiedMessage::from_inbound(message);
        if let Err(e) = self.store.insert_unclassified(&record).await {
            error!(
                sender = %message.sender_email,
                source = %message.source_address,
                error = %e,
                "Failed to save unclassified message"
            );
        }
    }

    async fn record_raw_email(&self, message: &InboundMessage, template: &Template) {
        let record = RawTransactionEmail::from_inbound(message);
        if let Err(e) = self.store.insert_raw_email(&record).await {
            error!(
                sender = %message.sender_email,
                source = %message.source_address,
                template = %template.name(),
                error = %e,
                "Failed to save transaction email"
            );
        }
    }

    async fn notify(&self, message: &InboundMessage, template: &Template, tx: &Transaction) {
        let payload = NotificationPayload::from_transaction(tx);
        let outcome = self
            .forwarder
            .post(&self.callback.url, &self.callback.token, &payload)
            .await;

        let record = NotificationRecord::new(
            &self.callback.url,
            &message.sender_email,
            template.name(),
            outcome,
        );

        if record.sent {
            info!(
                transaction = %tx.id,
                template = %template.name(),
                "Transaction notification delivered"
            );
        } else {
            error!(
                transaction = %tx.id,
                sender = %message.sender_email,
                status = %record.status_text,
                "Failure posting notification"
            );
        }

        if let Err(e) = self.store.insert_notification(&record).await {
            error!(
                error = %e,
                status = %record.status_text,
                "Failure saving notification"
            );
        }
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal pipeline transition {state} -> {next}"
    );
    debug!(from = %state, to = %next, "Pipeline transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::config::TemplateConfig;
    use crate::store::LibSqlBackend;

    fn template_config() -> TemplateConfig {
        TemplateConfig {
            email: "alerts@bank.example".into(),
            name: "National Bank".into(),
            date_pattern: "on (?P<date>[0-9]{8})".into(),
            amount_pattern: "(?P<amount>[0-9,.]{3,18}) on ".into(),
            currency_pattern: "with (?P<currency>[A-Z]{3})".into(),
            account_number_pattern: String::new(),
            vendor_reference_id_pattern: r"Description: (?P<vendorReferenceId>[0-9A-Za-z]+)\."
                .into(),
            transaction_reference_id_pattern: String::new(),
        }
    }

    async fn make_pipeline() -> (Pipeline, Arc<LibSqlBackend>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let registry = Arc::new(TemplateRegistry::from_configs(&[template_config()]));
        let pipeline = Pipeline::new(
            registry,
            Extractor::default(),
            store.clone(),
            CallbackForwarder::with_timeout(Duration::from_millis(200)).unwrap(),
            CallbackConfig {
                url: "http://127.0.0.1:9/callback".into(),
                token: SecretString::from("token".to_string()),
            },
        );
        (pipeline, store)
    }

    fn message(sender: &str, body: &str) -> InboundMessage {
        InboundMessage {
            source_address: "127.0.0.1:50000".into(),
            sender_email: sender.into(),
            recipients: vec!["payments@relay.example".into()],
            subject: "Credit".into(),
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn unknown_sender_is_recorded_as_unclassified() {
        let (pipeline, store) = make_pipeline().await;
        let state = pipeline
            .run(message("someone@else.example", "hello"))
            .await;

        assert_eq!(state, PipelineState::SpamRecorded);
        assert_eq!(store.list_unclassified(10).await.unwrap().len(), 1);
        assert!(store.list_raw_emails(10).await.unwrap().is_empty());
        assert!(store.list_transactions(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_required_field_stops_after_audit() {
        let (pipeline, store) = make_pipeline().await;
        let state = pipeline
            .run(message("ALERTS@bank.example", "nothing useful in here"))
            .await;

        assert_eq!(state, PipelineState::ExtractFailed);
        assert_eq!(store.list_raw_emails(10).await.unwrap().len(), 1);
        assert!(store.list_unclassified(10).await.unwrap().is_empty());
        assert!(store.list_transactions(10).await.unwrap().is_empty());
        assert!(store.list_notifications(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_callback_still_records_notification() {
        let (pipeline, store) = make_pipeline().await;
        let body = "credited with MWK20,000.00 on 20220505.\nDescription: 98324HAZ.";
        let state = pipeline.run(message("alerts@bank.example", body)).await;

        assert_eq!(state, PipelineState::Done);
        let txs = store.list_transactions(10).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, "20,000.00");

        let notes = store.list_notifications(10).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(!notes[0].sent);
        assert!(notes[0].status_text.starts_with("failure sending request to"));
        assert_eq!(notes[0].from_email, "alerts@bank.example");
    }
}
