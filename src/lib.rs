//! # Bithook
//!
//! Blockchain feed webhook bridge - subscribes to a real-time blockchain
//! feed over a websocket and POSTs every event it receives to a callback URL.
//!
//! ## Features
//!
//! - **Subscriptions**: New blocks, unconfirmed transactions, a single address, or debug pings
//! - **Keep-alive**: Periodic websocket pings, cancelled with the connection
//! - **Webhooks**: One `{"data": <event>}` POST per event, in feed order
//!
//! ## Modules
//!
//! - [`feed`]: Websocket connection to the feed
//! - [`relay`]: Callback delivery
//! - [`bridge`]: Wires a feed subscription to the relay
//! - [`config`]: File and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bithook::{Bridge, Config, SubscriptionRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::from_env();
//!     config.relay.callback_url = Some("http://localhost:9000/hook".to_string());
//!
//!     let bridge = Bridge::new(&config)?;
//!
//!     // Runs until the feed connection fails
//!     let Err(e) = bridge.run(&SubscriptionRequest::Blocks).await else {
//!         unreachable!()
//!     };
//!     eprintln!("feed stopped: {}", e);
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod feed;
pub mod relay;

#[cfg(test)]
mod test_support;

pub use bridge::{Bridge, BridgeError};

pub use config::{
    generate_default_config, Config, ConfigError, FeedConfig, LoggingConfig, RelayConfig,
};

pub use feed::{Event, FeedConnection, FeedError, StreamError, SubscriptionRequest};

pub use relay::{CallbackTarget, DeliveryOutcome, Relay, RelayError};
