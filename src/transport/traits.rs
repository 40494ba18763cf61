//! Transport trait abstraction for pluggable connector backends

use bytes::Bytes;
use tokio::sync::oneshot;

/// Dispatches requests to a named connector
///
/// The returned channel yields the connector's response exactly once. A
/// transport that cannot dispatch drops the sender, closing the channel.
pub trait RpcTransport: Send + Sync {
    fn call(&self, target: &str, id: &str, payload: Bytes) -> oneshot::Receiver<Bytes>;
}
