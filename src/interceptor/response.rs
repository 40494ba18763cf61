//! Read half of the pipeline shared by call responses and notifications

use super::Inner;
use crate::actions::read_action;
use bytes::Bytes;
use ric_edge_shared::envelope::{state_key, ActionValue, Request, Response};
use serde_json::Value;
use tracing::{debug, error};

impl Inner {
    /// Transform, store and publish the result of a read call
    ///
    /// Anything that is not a plain result for a known parent is returned as
    /// received.
    pub(super) async fn prepare_response(&self, request: &Request, raw: Bytes) -> Bytes {
        let Some(parent) = request.parent() else {
            return raw;
        };

        let mut response: Response = match serde_json::from_slice(&raw) {
            Ok(response) => response,
            Err(e) => {
                error!(
                    method = request.method_str(),
                    parent,
                    value = %String::from_utf8_lossy(&raw),
                    error = %e,
                    "Unreadable response"
                );
                return raw;
            }
        };

        if response.is_notification() {
            return raw;
        }
        let Some(result) = response.result.take() else {
            return raw;
        };

        let value = self.apply_read_action(parent, result);

        if let Err(e) = self.state.set(state_key(parent), value.clone()) {
            error!(parent, error = %e, "Store state failed");
        }
        self.publisher.send_state(parent, value.clone()).await;

        response.result = Some(value);
        match serde_json::to_vec(&response) {
            Ok(encoded) => Bytes::from(encoded),
            Err(e) => {
                error!(parent, error = %e, "Encode response failed");
                raw
            }
        }
    }

    /// Run the read transform for `parent`, falling back to the input value
    pub(super) fn apply_read_action(&self, parent: &str, value: Value) -> Value {
        let input = ActionValue::decode_base64(value);
        match self.actions.execute(&read_action(parent), input.clone()) {
            Ok(Some(output)) => output.into_json(),
            Ok(None) => input.into_json(),
            Err(e) => {
                debug!(parent, error = %e, "Read action skipped");
                input.into_json()
            }
        }
    }
}
