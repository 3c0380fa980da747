//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. File databases run in WAL
//! mode with a busy timeout so concurrent pipeline tasks can insert through
//! the one shared connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::notify::NotificationRecord;
use crate::pipeline::types::{RawTransactionEmail, UnclassifiedMessage};
use crate::store::migrations;
use crate::store::traits::Database;
use crate::transaction::Transaction;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, busy_timeout: Duration) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        pragma(&conn, "PRAGMA journal_mode=WAL").await?;
        pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", busy_timeout.as_millis()),
        )
        .await?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Run a pragma and step its result row, if any.
async fn pragma(conn: &Connection, sql: &str) -> Result<(), DatabaseError> {
    let mut rows = conn
        .query(sql, ())
        .await
        .map_err(|e| DatabaseError::Pool(format!("{sql}: {e}")))?;
    rows.next()
        .await
        .map_err(|e| DatabaseError::Pool(format!("{sql}: {e}")))?;
    Ok(())
}

/// Canonical write format: fixed-width RFC 3339 so text ordering is time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_id(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|e| {
        warn!(id = s, error = %e, "Unparseable row id");
        Uuid::nil()
    })
}

/// Recipients are stored as a JSON array so entries round-trip unchanged.
fn encode_recipients(recipients: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(recipients)
        .map_err(|e| DatabaseError::Query(format!("encode recipients: {e}")))
}

fn decode_recipients(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_else(|e| {
        warn!(recipients = s, error = %e, "Unparseable recipient list");
        Vec::new()
    })
}

/// Column order: 0:id, 1:created_at, 2:body, 3:source_address, 4:subject, 5:sender_email
fn row_to_unclassified(row: &libsql::Row) -> Result<UnclassifiedMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let created: String = row.get(1)?;
    Ok(UnclassifiedMessage {
        id: parse_id(&id),
        created_at: parse_datetime(&created),
        body: row.get(2)?,
        source_address: row.get(3)?,
        subject: row.get(4)?,
        sender_email: row.get(5)?,
    })
}

/// Same as unclassified plus 6:recipients.
fn row_to_raw_email(row: &libsql::Row) -> Result<RawTransactionEmail, libsql::Error> {
    let id: String = row.get(0)?;
    let created: String = row.get(1)?;
    let recipients: String = row.get(6)?;
    Ok(RawTransactionEmail {
        id: parse_id(&id),
        created_at: parse_datetime(&created),
        body: row.get(2)?,
        source_address: row.get(3)?,
        subject: row.get(4)?,
        sender_email: row.get(5)?,
        recipients: decode_recipients(&recipients),
    })
}

fn row_to_transaction(row: &libsql::Row) -> Result<Transaction, libsql::Error> {
    let id: String = row.get(0)?;
    let created: String = row.get(1)?;
    Ok(Transaction {
        id: parse_id(&id),
        created_at: parse_datetime(&created),
        template_name: row.get(2)?,
        date: row.get(3)?,
        amount: row.get(4)?,
        currency: row.get(5)?,
        account_number: row.get(6)?,
        vendor_reference_id: row.get(7)?,
        transaction_reference_id: row.get(8)?,
    })
}

fn row_to_notification(row: &libsql::Row) -> Result<NotificationRecord, libsql::Error> {
    let id: String = row.get(0)?;
    let created: String = row.get(1)?;
    let sent: i64 = row.get(4)?;
    Ok(NotificationRecord {
        id: parse_id(&id),
        created_at: parse_datetime(&created),
        callback_url: row.get(2)?,
        payload: row.get(3)?,
        sent: sent != 0,
        status_text: row.get(5)?,
        response_text: row.get(6)?,
        from_email: row.get(7)?,
        template_name: row.get(8)?,
    })
}

/// Collect every row of a query through `map`, propagating read errors.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    context: &str,
    map: fn(&libsql::Row) -> Result<T, libsql::Error>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{context}: {e}")))?
    {
        match map(&row) {
            Ok(item) => out.push(item),
            Err(e) => warn!("Skipping {context} row: {e}"),
        }
    }
    Ok(out)
}

// ── Trait implementation ────────────────────────────────────────────

const UNCLASSIFIED_COLUMNS: &str = "id, created_at, body, source_address, subject, sender_email";

const RAW_EMAIL_COLUMNS: &str =
    "id, created_at, body, source_address, subject, sender_email, recipients";

const TRANSACTION_COLUMNS: &str = "id, created_at, template_name, date, amount, currency, account_number, vendor_reference_id, transaction_reference_id";

const NOTIFICATION_COLUMNS: &str = "id, created_at, callback_url, payload, sent, status_text, response_text, from_email, template_name";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Audit ───────────────────────────────────────────────────────

    async fn insert_unclassified(
        &self,
        message: &UnclassifiedMessage,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO unclassified_messages ({UNCLASSIFIED_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    message.id.to_string(),
                    format_datetime(&message.created_at),
                    message.body.as_str(),
                    message.source_address.as_str(),
                    message.subject.as_str(),
                    message.sender_email.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_unclassified: {e}")))?;

        debug!(id = %message.id, sender = %message.sender_email, "Unclassified message stored");
        Ok(())
    }

    async fn insert_raw_email(&self, email: &RawTransactionEmail) -> Result<(), DatabaseError> {
        let recipients = encode_recipients(&email.recipients)?;
        self.conn()
            .execute(
                &format!("INSERT INTO raw_transaction_emails ({RAW_EMAIL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    email.id.to_string(),
                    format_datetime(&email.created_at),
                    email.body.as_str(),
                    email.source_address.as_str(),
                    email.subject.as_str(),
                    email.sender_email.as_str(),
                    recipients,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_raw_email: {e}")))?;

        debug!(id = %email.id, sender = %email.sender_email, "Raw transaction email stored");
        Ok(())
    }

    // ── Transactions ────────────────────────────────────────────────

    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    tx.id.to_string(),
                    format_datetime(&tx.created_at),
                    tx.template_name.as_str(),
                    tx.date.as_str(),
                    tx.amount.as_str(),
                    tx.currency.as_str(),
                    tx.account_number.as_str(),
                    tx.vendor_reference_id.as_str(),
                    tx.transaction_reference_id.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_transaction: {e}")))?;

        debug!(id = %tx.id, template = %tx.template_name, "Transaction stored");
        Ok(())
    }

    // ── Notifications ───────────────────────────────────────────────

    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    record.id.to_string(),
                    format_datetime(&record.created_at),
                    record.callback_url.as_str(),
                    record.payload.as_str(),
                    i64::from(record.sent),
                    record.status_text.as_str(),
                    record.response_text.as_str(),
                    record.from_email.as_str(),
                    record.template_name.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_notification: {e}")))?;

        debug!(id = %record.id, sent = record.sent, "Notification record stored");
        Ok(())
    }

    // ── Inspection ──────────────────────────────────────────────────

    async fn list_unclassified(
        &self,
        limit: usize,
    ) -> Result<Vec<UnclassifiedMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {UNCLASSIFIED_COLUMNS} FROM unclassified_messages ORDER BY created_at DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_unclassified: {e}")))?;
        collect_rows(rows, "unclassified", row_to_unclassified).await
    }

    async fn list_raw_emails(
        &self,
        limit: usize,
    ) -> Result<Vec<RawTransactionEmail>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {RAW_EMAIL_COLUMNS} FROM raw_transaction_emails ORDER BY created_at DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_raw_emails: {e}")))?;
        collect_rows(rows, "raw email", row_to_raw_email).await
    }

    async fn list_transactions(&self, limit: usize) -> Result<Vec<Transaction>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY created_at DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_transactions: {e}")))?;
        collect_rows(rows, "transaction", row_to_transaction).await
    }

    async fn list_notifications(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications ORDER BY created_at DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_notifications: {e}")))?;
        collect_rows(rows, "notification", row_to_notification).await
    }
}
