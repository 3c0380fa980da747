//! `Database` trait: the single async interface for all persistence.
//!
//! Every entity is insert-only. Nothing is updated or deleted once written.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::notify::NotificationRecord;
use crate::pipeline::types::{RawTransactionEmail, UnclassifiedMessage};
use crate::transaction::Transaction;

/// Backend-agnostic persistence for audit records, transactions and
/// notification attempts.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Audit ───────────────────────────────────────────────────────

    /// Record a message from a sender with no template.
    async fn insert_unclassified(&self, message: &UnclassifiedMessage)
    -> Result<(), DatabaseError>;

    /// Record the audit copy of a templated message.
    async fn insert_raw_email(&self, email: &RawTransactionEmail) -> Result<(), DatabaseError>;

    // ── Transactions ────────────────────────────────────────────────

    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), DatabaseError>;

    // ── Notifications ───────────────────────────────────────────────

    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), DatabaseError>;

    // ── Inspection ──────────────────────────────────────────────────

    /// Most recent unclassified messages first, up to `limit`.
    async fn list_unclassified(&self, limit: usize)
    -> Result<Vec<UnclassifiedMessage>, DatabaseError>;

    /// Most recent audit copies first, up to `limit`.
    async fn list_raw_emails(&self, limit: usize)
    -> Result<Vec<RawTransactionEmail>, DatabaseError>;

    /// Most recent transactions first, up to `limit`.
    async fn list_transactions(&self, limit: usize) -> Result<Vec<Transaction>, DatabaseError>;

    /// Most recent notification attempts first, up to `limit`.
    async fn list_notifications(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, DatabaseError>;
}
