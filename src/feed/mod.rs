//! Real-Time Feed Client
//!
//! Streams events from the remote blockchain feed over a websocket.
//!
//! ## Architecture
//!
//! - **FeedConnection**: One websocket, one subscription, one heartbeat
//! - **Messages**: Subscription control messages and the event type
//!
//! ## Wire Format
//!
//! Control messages are JSON text frames:
//! - `{"op":"blocks_sub"}` - New blocks
//! - `{"op":"unconfirmed_sub"}` - New unconfirmed transactions
//! - `{"op":"addr_sub","addr":"<address>"}` - One address
//! - `{"op":"ping_tx"}` / `{"op":"ping_block"}` - Debug replies
//!
//! Every inbound data frame is a JSON object and becomes one [`Event`].

mod connection;
mod error;
mod messages;

pub use connection::FeedConnection;
pub use error::{FeedError, StreamError};
pub use messages::{Event, SubscriptionRequest, HEARTBEAT_PAYLOAD};
