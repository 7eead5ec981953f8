//! Feed-to-webhook bridge
//!
//! Connects to the feed, issues one subscription, and relays every event
//! to the callback target in arrival order. Delivery happens inline, so a
//! slow webhook holds back the next read.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::config::{Config, ConfigError, FeedConfig};
use crate::feed::{Event, FeedConnection, FeedError, SubscriptionRequest};
use crate::relay::{DeliveryOutcome, Relay, RelayError};

/// One feed subscription wired to one relay
pub struct Bridge {
    feed: FeedConfig,
    relay: Relay,
    received: AtomicU64,
}

impl Bridge {
    /// Validate `config` and build the relay
    pub fn new(config: &Config) -> Result<Self, BridgeError> {
        config.validate()?;
        let relay = Relay::new(config.callback_target()?)?;

        Ok(Self {
            feed: config.feed.clone(),
            relay,
            received: AtomicU64::new(0),
        })
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Events handed to the relay so far, whether or not delivery is enabled
    pub fn events_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Open the feed connection with its heartbeat running
    pub async fn connect(&self) -> Result<FeedConnection, BridgeError> {
        let mut conn = FeedConnection::connect(&self.feed.url).await?;
        conn.start_heartbeat(self.feed.heartbeat_interval());
        Ok(conn)
    }

    /// Subscribe and relay events until the feed fails
    ///
    /// Connection and stream failures end the run. Delivery failures are
    /// logged and the next event is processed.
    pub async fn run(&self, request: &SubscriptionRequest) -> Result<Infallible, BridgeError> {
        tracing::info!("Subscribing to {}", request);

        if let Some(target) = self.relay.target() {
            tracing::info!(callback = %target, "Relaying events");
        } else {
            tracing::info!("No callback URL configured, events will only be logged");
        }

        let mut conn = self.connect().await.map_err(log_connection_failure)?;
        conn.subscribe(request)
            .await
            .map_err(|e| log_connection_failure(e.into()))?;

        let relay = &self.relay;
        let received = &self.received;
        let result = conn
            .receive_loop(|event| {
                received.fetch_add(1, Ordering::Relaxed);
                relay_event(relay, event)
            })
            .await;

        result.map_err(|e| {
            let count = self.events_received();
            if e.is_stream_error() {
                tracing::error!(error = %e, events = count, "Feed stream terminated");
            } else {
                tracing::error!(error = %e, events = count, "Feed connection failed");
            }
            BridgeError::from(e)
        })
    }
}

fn log_connection_failure(e: BridgeError) -> BridgeError {
    tracing::error!(error = %e, "Feed connection failed");
    e
}

async fn relay_event(relay: &Relay, event: Event) {
    match serde_json::to_string(&event) {
        Ok(json) => tracing::info!(event = %json, "Received event"),
        Err(e) => tracing::warn!(error = %e, "Received event that cannot be re-encoded"),
    }

    match relay.deliver(&event).await {
        Ok(DeliveryOutcome::Skipped) => {
            tracing::debug!("Delivery disabled, event not relayed");
        }
        Ok(DeliveryOutcome::Delivered { status }) => {
            tracing::debug!(status, "Event relayed");
        }
        Err(e) => {
            tracing::error!(error = %e, "Callback delivery failed, continuing");
        }
    }
}

/// Errors that end a bridge run
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}
