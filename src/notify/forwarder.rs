//! Callback forwarder: POSTs a notification payload to the configured endpoint.
//!
//! One attempt per notification: no retries and no backoff. The outcome is
//! always returned as data so the caller can persist it.

use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, DATE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::notify::payload::{DeliveryOutcome, NotificationPayload};

/// Tool name advertised in the user agent.
pub const USER_AGENT_NAME: &str = "go-transact";

/// Integer protocol version advertised in the user agent.
pub const USER_AGENT_VERSION: u32 = 1;

/// Header carrying the shared callback token.
pub const TOKEN_HEADER: &str = "X-Go-Transact-Token";

/// End-to-end bound on a single callback request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// `go-transact/1`
pub fn user_agent() -> String {
    format!("{USER_AGENT_NAME}/{USER_AGENT_VERSION}")
}

/// HTTP client for callback delivery.
#[derive(Debug, Clone)]
pub struct CallbackForwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl CallbackForwarder {
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Build a forwarder with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Request(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Serialize and POST `payload`, reporting the outcome.
    ///
    /// Only an exact `200` counts as delivered.
    pub async fn post(
        &self,
        url: &str,
        token: &SecretString,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                let err = DeliveryError::from(e);
                warn!(url = %url, error = %err, "Failed to serialize notification");
                return DeliveryOutcome::failed(String::new(), &err);
            }
        };

        match self.send(url, token, &body).await {
            Ok(()) => {
                debug!(url = %url, "Callback posted");
                DeliveryOutcome::delivered(body)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Callback delivery failed");
                DeliveryOutcome::failed(body, &e)
            }
        }
    }

    async fn send(&self, url: &str, token: &SecretString, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(url)
            .header(TOKEN_HEADER, token.expose_secret())
            .header(DATE, http_date())
            .header(USER_AGENT, user_agent())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    DeliveryError::Request(e.to_string())
                } else if e.is_timeout() {
                    DeliveryError::Send {
                        url: url.to_string(),
                        reason: format!("request timed out after {:?}", self.timeout),
                    }
                } else {
                    DeliveryError::Send {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let response_text = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        )
        .trim_end()
        .to_string();

        Err(DeliveryError::Status {
            code: status.as_u16(),
            response_text,
        })
    }
}

/// Current time in IMF-fixdate form for the `Date` header.
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
