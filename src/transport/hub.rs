//! Connector hub: routes requests to connectors and matches responses by id

use super::traits::RpcTransport;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Just enough of an envelope to correlate it
#[derive(Deserialize)]
struct Correlation {
    #[serde(default)]
    id: Option<Value>,
}

/// Registry of live connectors plus the table of calls awaiting a response
///
/// Messages from connectors that answer a pending call resolve it; all other
/// messages are device notifications and go to the inbound channel.
pub struct ConnectorHub {
    connectors: RwLock<HashMap<String, mpsc::Sender<Bytes>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Bytes>>>,
    notifications: mpsc::Sender<Bytes>,
}

impl ConnectorHub {
    pub fn new(notifications: mpsc::Sender<Bytes>) -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            notifications,
        }
    }

    /// Attach a connector's outbound queue, replacing any previous one
    pub fn register(&self, name: &str, outbound: mpsc::Sender<Bytes>) {
        if self
            .connectors
            .write()
            .insert(name.to_string(), outbound)
            .is_some()
        {
            warn!("Connector {} re-registered, previous link replaced", name);
        } else {
            info!("Connector {} registered", name);
        }
    }

    /// Detach a connector if `outbound` is still its registered queue
    pub fn unregister(&self, name: &str, outbound: &mpsc::Sender<Bytes>) {
        let mut connectors = self.connectors.write();
        if connectors
            .get(name)
            .is_some_and(|current| current.same_channel(outbound))
        {
            connectors.remove(name);
            info!("Connector {} unregistered", name);
        }
    }

    pub fn connectors(&self) -> Vec<String> {
        self.connectors.read().keys().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Route a message received from a connector
    pub async fn deliver(&self, message: Bytes) {
        let id = serde_json::from_slice::<Correlation>(&message)
            .ok()
            .and_then(|c| c.id)
            .and_then(|id| id.as_str().map(str::to_owned));

        if let Some(id) = id {
            let waiter = self.pending.lock().remove(&id);
            if let Some(waiter) = waiter {
                if waiter.send(message).is_err() {
                    debug!("Response {} arrived after its caller gave up", id);
                }
                return;
            }
        }

        if self.notifications.send(message).await.is_err() {
            warn!("Inbound notification channel closed, message dropped");
        }
    }
}

impl RpcTransport for ConnectorHub {
    fn call(&self, target: &str, id: &str, payload: Bytes) -> oneshot::Receiver<Bytes> {
        let (tx, rx) = oneshot::channel();

        let Some(outbound) = self.connectors.read().get(target).cloned() else {
            warn!("No connector {} for request {}", target, id);
            return rx;
        };

        {
            let mut pending = self.pending.lock();
            // callers that timed out leave closed entries behind
            pending.retain(|_, waiter| !waiter.is_closed());
            pending.insert(id.to_string(), tx);
        }

        if let Err(e) = outbound.try_send(payload) {
            warn!("Dispatch of request {} to {} failed: {}", id, target, e);
            self.pending.lock().remove(id);
        }

        rx
    }
}
