use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use transact_relay::channels::{IngestState, MailboxFilter, http_ingest, ingest_routes};
use transact_relay::config::{AppConfig, DEFAULT_CONFIG_PATH};
use transact_relay::extraction::Extractor;
use transact_relay::logging::init_logging;
use transact_relay::notify::CallbackForwarder;
use transact_relay::pipeline::{MessageDispatcher, Pipeline};
use transact_relay::store::{Database, LibSqlBackend};
use transact_relay::templates::TemplateRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("TRANSACT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    let _log_guard = init_logging(&config.log);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        "Starting transact relay"
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.database.path, config.database.busy_timeout())
            .await
            .with_context(|| {
                format!(
                    "failed to open database at {}",
                    config.database.path.display()
                )
            })?,
    );

    // ── Pipeline ─────────────────────────────────────────────────────────
    let registry = Arc::new(TemplateRegistry::from_configs(&config.templates));
    if registry.is_empty() {
        warn!("No templates configured, every message will be stored as unclassified");
    }
    info!(templates = registry.len(), "Templates loaded");

    let extractor = Extractor::new(config.extraction.match_timeout());
    let forwarder = CallbackForwarder::new().context("failed to build callback client")?;
    let filter = MailboxFilter::new(&config.server.mailboxes);
    let max_in_flight = config.server.max_in_flight;
    let drain_timeout = Duration::from_secs(config.server.drain_timeout_secs);
    let address = config.server.address.clone();

    let pipeline = Arc::new(Pipeline::new(
        registry,
        extractor,
        db,
        forwarder,
        config.callback,
    ));
    let dispatcher = MessageDispatcher::new(pipeline, max_in_flight);

    // ── Transport ────────────────────────────────────────────────────────
    let listener = http_ingest::bind(&address).await?;
    let app = ingest_routes(IngestState::new(dispatcher.clone(), filter));
    info!(
        address = %address,
        max_in_flight = dispatcher.max_in_flight(),
        "Accepting messages"
    );

    http_ingest::serve(listener, app, shutdown_signal()).await?;

    // ── Shutdown ─────────────────────────────────────────────────────────
    dispatcher.shutdown();
    if !dispatcher.drain(drain_timeout).await {
        warn!(
            in_flight = dispatcher.in_flight(),
            "Exiting with messages still in flight"
        );
    }
    info!("Transact relay stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
