//! Feed Message Types
//!
//! Control messages sent to the feed and the shape of events received
//! from it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An event received from the feed.
///
/// The feed's schema is not validated; any JSON object is accepted and
/// passed through untouched.
pub type Event = serde_json::Map<String, serde_json::Value>;

/// Payload carried by heartbeat ping frames
pub const HEARTBEAT_PAYLOAD: &[u8] = br#""op": "ping""#;

/// Subscription control messages understood by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum SubscriptionRequest {
    /// New blocks
    #[serde(rename = "blocks_sub")]
    Blocks,
    /// New unconfirmed transactions
    #[serde(rename = "unconfirmed_sub")]
    Unconfirmed,
    /// Transactions touching one address
    #[serde(rename = "addr_sub")]
    Address {
        /// Address to watch, sent verbatim
        addr: String,
    },
    /// Debug: feed replies with its latest transaction
    #[serde(rename = "ping_tx")]
    DebugPing,
    /// Debug: feed replies with its latest block
    #[serde(rename = "ping_block")]
    DebugPingBlock,
}

impl SubscriptionRequest {
    /// Address subscription
    pub fn address(addr: impl Into<String>) -> Self {
        Self::Address { addr: addr.into() }
    }

    /// Value of the `op` field on the wire
    pub fn op(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks_sub",
            Self::Unconfirmed => "unconfirmed_sub",
            Self::Address { .. } => "addr_sub",
            Self::DebugPing => "ping_tx",
            Self::DebugPingBlock => "ping_block",
        }
    }

    /// Serialize into the text frame sent to the feed
    pub fn to_control_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocks => write!(f, "blocks"),
            Self::Unconfirmed => write!(f, "unconfirmed transactions"),
            Self::Address { addr } => write!(f, "address {}", addr),
            Self::DebugPing => write!(f, "test ping"),
            Self::DebugPingBlock => write!(f, "test block ping"),
        }
    }
}
