//! Webhook Relay
//!
//! Forwards decoded feed events to a user-configured HTTP endpoint.
//!
//! ## Request Format
//!
//! ```text
//! POST <callback_url>
//! Content-Type: application/json
//! User-Agent: bithook-client-<version>
//!
//! {"data": <event>}
//! ```
//!
//! Delivery is best-effort: one attempt, no retry, no batching.

mod client;

pub use client::{user_agent, CallbackTarget, DeliveryOutcome, Relay, RelayError};
