//! Broker transport seam for build requests.
//!
//! Any broker binding implements [`BrokerTransport`]; the build client only
//! depends on these four operations.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Header carrying the route identity next to the correlation id.
pub const ROUTE_UUID_HEADER: &str = "route_uuid";

/// Exclusive, single-use reply destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyChannel {
    pub name: String,
}

/// Request published to a work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub routing_key: String,
    pub correlation_id: String,
    /// Reply channel address the worker must answer to.
    pub reply_to: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Message consumed from a reply channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub correlation_id: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker unreachable or connection state unusable.
    Unavailable(String),
    /// Broker refused the operation.
    Rejected(String),
    /// Reply channel does not exist (never provisioned or already torn down).
    ChannelGone(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "broker unavailable: {message}"),
            Self::Rejected(message) => write!(f, "broker rejected operation: {message}"),
            Self::ChannelGone(name) => write!(f, "reply channel gone: {name}"),
        }
    }
}

impl Error for TransportError {}

/// Blocking broker operations used by one build exchange.
pub trait BrokerTransport: Send + Sync {
    /// Creates an exclusive reply channel named `name`.
    fn provision_reply_channel(&self, name: &str) -> Result<ReplyChannel, TransportError>;

    fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Waits up to `timeout` for one message. `Ok(None)` means the wait
    /// elapsed with nothing delivered.
    fn await_one_message(
        &self,
        channel: &ReplyChannel,
        timeout: Duration,
    ) -> Result<Option<InboundMessage>, TransportError>;

    /// Deletes the channel and anything still queued on it. Tearing down a
    /// missing channel is not an error.
    fn teardown_channel(&self, channel: &ReplyChannel) -> Result<(), TransportError>;
}
