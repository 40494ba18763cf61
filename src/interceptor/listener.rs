use super::Inner;
use bytes::Bytes;
use ric_edge_shared::envelope::{state_key, Request};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Apply device notifications one at a time, in arrival order
pub(super) async fn run(inner: Arc<Inner>, mut inbound: mpsc::Receiver<Bytes>) {
    while let Some(message) = inbound.recv().await {
        inner.handle_notification(&message).await;
    }
    info!("Inbound queue closed, notification listener stopped");
}

impl Inner {
    async fn handle_notification(&self, message: &[u8]) {
        let request: Request = match serde_json::from_slice(message) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    value = %String::from_utf8_lossy(message),
                    error = %e,
                    "Unreadable notification"
                );
                return;
            }
        };

        let Some(value) = request
            .params()
            .and_then(|p| p.value.clone())
            .filter(|v| !v.is_null())
        else {
            error!(method = request.method_str(), "Notification has no value");
            return;
        };
        let Some(parent) = request.notification_parent() else {
            error!(method = request.method_str(), "Notification has no _parent");
            return;
        };
        debug!("Notification for {}", parent);

        let value = self.apply_read_action(parent, value);

        // Unlike the call path, an update that was not stored is not published
        if let Err(e) = self.state.set(state_key(parent), value.clone()) {
            error!(parent, error = %e, "Store state failed, update not published");
            return;
        }
        self.publisher.send_state(parent, value).await;
    }
}
