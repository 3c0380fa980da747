//! Message dispatcher: one tracked task per inbound message.
//!
//! The transport boundary calls `handle_inbound_message` and returns
//! immediately. A message counts as in flight from the moment it is accepted
//! until its task finishes, so `drain` also waits for tasks that have not
//! yet been scheduled. A semaphore bounds how many pipeline runs execute at
//! once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::pipeline::orchestrator::Pipeline;
use crate::pipeline::types::InboundMessage;

/// Spawns pipeline runs for inbound messages.
#[derive(Clone)]
pub struct MessageDispatcher {
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    accepted: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
}

/// Held by a spawned task; releases the message's in-flight slot on drop,
/// including when the task panics.
struct InFlight {
    accepted: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.accepted.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl MessageDispatcher {
    /// `max_in_flight` is clamped to at least one.
    pub fn new(pipeline: Arc<Pipeline>, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            accepted: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hand a message to the pipeline. Fire-and-forget.
    ///
    /// Returns `false` if the dispatcher is shutting down and the message
    /// was not accepted.
    pub fn handle_inbound_message(
        &self,
        source_address: &str,
        sender_email: &str,
        recipients: Vec<String>,
        subject: &str,
        body: &str,
    ) -> bool {
        self.dispatch(InboundMessage {
            source_address: source_address.to_string(),
            sender_email: sender_email.to_string(),
            recipients,
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }

    /// Spawn a pipeline task for an already assembled message.
    pub fn dispatch(&self, message: InboundMessage) -> bool {
        if self.is_shutting_down() {
            warn!(
                sender = %message.sender_email,
                "Dispatcher shutting down, message dropped"
            );
            return false;
        }

        self.accepted.fetch_add(1, Ordering::SeqCst);
        let slot = InFlight {
            accepted: Arc::clone(&self.accepted),
            idle: Arc::clone(&self.idle),
        };

        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _slot = slot;
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!("Dispatcher closed before message could run");
                return;
            };
            let sender = message.sender_email.clone();
            let state = pipeline.run(message).await;
            debug!(sender = %sender, state = %state, "Message finished");
        });
        true
    }

    /// Stop accepting new messages. Running tasks are left alone.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("Dispatcher stopped accepting messages");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Number of accepted messages whose task has not finished.
    pub fn in_flight(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Upper bound on concurrently running pipelines.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Wait up to `timeout` for every accepted message to finish.
    ///
    /// Returns `true` if everything drained in time. Tasks still running
    /// when the timeout expires keep running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.wait_idle()).await {
            Ok(()) => {
                info!("Dispatcher drained");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.in_flight(),
                    timeout_secs = timeout.as_secs_f64(),
                    "Dispatcher drain timed out"
                );
                false
            }
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::CallbackConfig;
    use crate::extraction::Extractor;
    use crate::notify::CallbackForwarder;
    use crate::store::{Database, LibSqlBackend};
    use crate::templates::TemplateRegistry;

    async fn make_dispatcher(max_in_flight: usize) -> (MessageDispatcher, Arc<LibSqlBackend>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let pipeline = Pipeline::new(
            Arc::new(TemplateRegistry::default()),
            Extractor::default(),
            store.clone(),
            CallbackForwarder::new().unwrap(),
            CallbackConfig {
                url: "http://127.0.0.1:9/callback".into(),
                token: SecretString::from("token".to_string()),
            },
        );
        (MessageDispatcher::new(Arc::new(pipeline), max_in_flight), store)
    }

    fn send(dispatcher: &MessageDispatcher, sender: &str) -> bool {
        dispatcher.handle_inbound_message(
            "127.0.0.1:40000",
            sender,
            vec!["payments@relay.example".into()],
            "hello",
            "body",
        )
    }

    #[tokio::test]
    async fn drain_waits_for_messages_not_yet_started() {
        let (dispatcher, store) = make_dispatcher(4).await;
        for i in 0..10 {
            assert!(send(&dispatcher, &format!("sender{i}@unknown.example")));
        }
        assert_eq!(dispatcher.in_flight(), 10);

        dispatcher.shutdown();
        assert!(dispatcher.drain(Duration::from_secs(5)).await);
        assert_eq!(store.list_unclassified(100).await.unwrap().len(), 10);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_messages() {
        let (dispatcher, store) = make_dispatcher(1).await;
        dispatcher.shutdown();
        assert!(dispatcher.is_shutting_down());

        let accepted = dispatcher.handle_inbound_message(
            "127.0.0.1:40000",
            "late@unknown.example",
            Vec::new(),
            "",
            "",
        );
        assert!(!accepted);
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(dispatcher.drain(Duration::from_millis(100)).await);
        assert!(store.list_unclassified(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drain_times_out_while_message_waits_for_a_permit() {
        let (dispatcher, store) = make_dispatcher(1).await;
        let held = Arc::clone(&dispatcher.permits).acquire_owned().await.unwrap();

        assert!(send(&dispatcher, "queued@unknown.example"));
        assert!(!dispatcher.drain(Duration::from_millis(50)).await);
        assert_eq!(dispatcher.in_flight(), 1);

        drop(held);
        assert!(dispatcher.drain(Duration::from_secs(5)).await);
        assert_eq!(store.list_unclassified(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn drain_with_nothing_accepted_returns_immediately() {
        let (dispatcher, _store) = make_dispatcher(2).await;
        assert!(dispatcher.drain(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn zero_bound_is_clamped() {
        let (dispatcher, _store) = make_dispatcher(0).await;
        assert_eq!(dispatcher.max_in_flight(), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
