//! Build-request orchestration over a message broker.
//!
//! # Responsibility
//! - Define the broker transport seam.
//! - Run one-shot request/reply build exchanges and persist the result.
//! - Provide an in-process broker for embedding and tests.

pub mod client;
pub mod memory;
pub mod transport;

pub use client::{
    build_request_body, gather_build_request, BuildClientConfig, BuildError, BuildOutcome,
    BuildRequest, BuildRequestClient, BuildState,
};
pub use memory::InMemoryBroker;
pub use transport::{
    BrokerTransport, InboundMessage, OutboundMessage, ReplyChannel, TransportError,
    ROUTE_UUID_HEADER,
};
