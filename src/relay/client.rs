//! Callback delivery client
//!
//! POSTs each feed event, wrapped as `{"data": <event>}`, to the configured
//! webhook. One attempt per event; the response is logged and otherwise
//! ignored.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::feed::Event;

/// Validated webhook URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTarget {
    url: Url,
}

impl CallbackTarget {
    /// Parse an absolute `http` or `https` URL
    pub fn parse(url: &str) -> Result<Self, RelayError> {
        let parsed = Url::parse(url.trim()).map_err(|e| RelayError::InvalidTarget {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(Self { url: parsed }),
            scheme => Err(RelayError::InvalidTarget {
                url: url.to_string(),
                error: format!("unsupported scheme {}", scheme),
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// What happened to one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No callback configured
    Skipped,
    /// The endpoint answered; any status counts
    Delivered { status: u16 },
}

/// Best-effort webhook relay
pub struct Relay {
    client: Client,
    target: Option<CallbackTarget>,
}

/// Body shape of every callback request
#[derive(Serialize)]
struct Envelope<'a> {
    data: &'a Event,
}

/// User agent sent with every callback
pub fn user_agent() -> String {
    format!("bithook-client-{}", env!("CARGO_PKG_VERSION"))
}

impl Relay {
    /// Create a relay; `None` disables delivery
    pub fn new(target: Option<CallbackTarget>) -> Result<Self, RelayError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .build()
            .map_err(RelayError::Client)?;

        Ok(Self { client, target })
    }

    pub fn target(&self) -> Option<&CallbackTarget> {
        self.target.as_ref()
    }

    /// Whether events will be POSTed anywhere
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// POST one event to the callback target
    ///
    /// Never retries. Any HTTP status is a completed delivery; only
    /// transport failures are errors.
    pub async fn deliver(&self, event: &Event) -> Result<DeliveryOutcome, RelayError> {
        let Some(target) = &self.target else {
            return Ok(DeliveryOutcome::Skipped);
        };

        let body = serde_json::to_vec(&Envelope { data: event }).map_err(RelayError::Encode)?;

        tracing::info!(url = %target, "Sending request");

        let response = self
            .client
            .post(target.url().clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(RelayError::Request)?;

        let status = response.status();
        tracing::debug!(headers = ?response.headers(), "Response headers");

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read response body");
                String::new()
            }
        };

        if status.is_success() {
            tracing::info!(status = %status, body = %text, "Callback delivered");
        } else {
            tracing::warn!(status = %status, body = %text, "Callback endpoint returned an error status");
        }

        Ok(DeliveryOutcome::Delivered {
            status: status.as_u16(),
        })
    }
}

/// Errors that can occur when relaying an event
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid callback URL {url}: {error}")]
    InvalidTarget { url: String, error: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Callback request failed: {0}")]
    Request(#[source] reqwest::Error),
}
