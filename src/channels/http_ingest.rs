//! HTTP ingest adapter: lets an upstream MTA hand accepted messages to the relay.
//!
//! `POST /messages` takes the envelope plus the raw RFC 5322 message, filters
//! recipients through the mailbox predicate and dispatches the message.
//! `GET /health` is a liveness probe.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::channels::email_types::{MailboxFilter, ParsedMail};
use crate::error::TransportError;
use crate::pipeline::{InboundMessage, MessageDispatcher};

/// Body of `POST /messages`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Address of the SMTP peer that delivered the message to the MTA.
    #[serde(default)]
    pub source_address: String,
    /// Envelope sender. Falls back to the `From` header when blank.
    #[serde(default)]
    pub sender: String,
    pub recipients: Vec<String>,
    /// Full RFC 5322 message.
    pub raw: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared state for the ingest routes.
#[derive(Clone)]
pub struct IngestState {
    pub dispatcher: MessageDispatcher,
    pub filter: Arc<MailboxFilter>,
}

impl IngestState {
    pub fn new(dispatcher: MessageDispatcher, filter: MailboxFilter) -> Self {
        Self {
            dispatcher,
            filter: Arc::new(filter),
        }
    }
}

/// Build the Axum router for `/messages` and `/health`.
pub fn ingest_routes(state: IngestState) -> Router {
    Router::new()
        .route("/messages", post(ingest_message))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn ingest_message(
    State(state): State<IngestState>,
    Json(req): Json<IngestRequest>,
) -> Response {
    let recipients = state.filter.filter_recipients(&req.recipients);
    if recipients.is_empty() {
        debug!(
            source = %req.source_address,
            recipients = ?req.recipients,
            "No accepted recipients"
        );
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "no accepted recipients");
    }

    let Some(mail) = ParsedMail::from_raw(&req.raw) else {
        warn!(source = %req.source_address, "Unreadable message body");
        return error_response(StatusCode::BAD_REQUEST, "message could not be parsed");
    };

    let sender_email = if req.sender.trim().is_empty() {
        mail.from.unwrap_or_default()
    } else {
        req.sender.trim().to_string()
    };

    let source_address = if req.source_address.is_empty() {
        "unknown".to_string()
    } else {
        req.source_address
    };

    let accepted = recipients.len();
    let dispatched = state.dispatcher.dispatch(InboundMessage {
        source_address,
        sender_email,
        recipients,
        subject: mail.subject,
        body: mail.body,
    });

    if !dispatched {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "shutting down");
    }

    (StatusCode::ACCEPTED, Json(IngestResponse { accepted })).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Bind the ingest listener. Any failure here is fatal at startup.
pub async fn bind(address: &str) -> Result<TcpListener, TransportError> {
    let addr = address
        .parse::<SocketAddr>()
        .map_err(|e| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;

    info!(address = %addr, "Ingest listener bound");
    Ok(listener)
}

/// Serve the ingest routes until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<(), TransportError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(TransportError::Serve)
}
