//! Feed error types

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Errors raised by a [`FeedConnection`](super::FeedConnection)
#[derive(Error, Debug)]
pub enum FeedError {
    /// Endpoint URL could not be turned into a websocket request
    #[error("Invalid feed endpoint {url}: {error}")]
    InvalidEndpoint { url: String, error: String },

    /// DNS, TCP, TLS or websocket handshake failed
    #[error("Failed to connect to feed: {0}")]
    Connect(#[source] WsError),

    /// Control message could not be serialized
    #[error("Failed to encode control message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Control message could not be written
    #[error("Failed to send to feed: {0}")]
    Send(#[source] WsError),

    /// The stream broke after the connection was established
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Mid-stream failures. All of them end the receive loop.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Transport failure while reading
    #[error("Feed connection lost: {0}")]
    Transport(#[source] WsError),

    /// Frame payload is not a JSON object
    #[error("Malformed feed frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// Remote sent a close frame
    #[error("Feed closed the connection{}", close_reason(.0))]
    Closed(Option<String>),

    /// Stream ended without a close frame
    #[error("Feed stream ended")]
    Ended,
}

fn close_reason(reason: &Option<String>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!(": {}", r),
        _ => String::new(),
    }
}

impl FeedError {
    /// True for failures that happened after the connection was established
    pub fn is_stream_error(&self) -> bool {
        matches!(self, FeedError::Stream(_) | FeedError::Send(_))
    }
}
