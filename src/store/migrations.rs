//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: r#"
            CREATE TABLE IF NOT EXISTS unclassified_messages (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL,
                source_address TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender_email TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_unclassified_created ON unclassified_messages(created_at);

            CREATE TABLE IF NOT EXISTS raw_transaction_emails (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL,
                source_address TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender_email TEXT NOT NULL,
                recipients TEXT NOT NULL -- JSON array
            );
            CREATE INDEX IF NOT EXISTS idx_raw_emails_created ON raw_transaction_emails(created_at);
            CREATE INDEX IF NOT EXISTS idx_raw_emails_sender ON raw_transaction_emails(sender_email);

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                template_name TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL DEFAULT '',
                account_number TEXT NOT NULL DEFAULT '',
                vendor_reference_id TEXT NOT NULL,
                transaction_reference_id TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at);
            CREATE INDEX IF NOT EXISTS idx_transactions_vendor_ref ON transactions(vendor_reference_id);

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                callback_url TEXT NOT NULL,
                payload TEXT NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0,
                status_text TEXT NOT NULL,
                response_text TEXT NOT NULL,
                from_email TEXT NOT NULL,
                template_name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at);
            CREATE INDEX IF NOT EXISTS idx_notifications_sent ON notifications(sent);
        "#,
}];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
