//! Connector transports
//!
//! This module handles:
//! - The `RpcTransport` seam the interceptor dispatches through
//! - Correlating connector responses to pending calls by request id
//! - Forwarding unsolicited device messages to the inbound channel
//! - The TCP link connectors attach to

mod hub;
mod tcp;
mod traits;

pub use hub::ConnectorHub;
pub use tcp::ConnectorServer;
pub use traits::RpcTransport;
