//! Outbound request pipeline: template, envelope checks, write transform

use super::error::CallError;
use crate::actions::{write_action, ActionRegistry};
use bytes::Bytes;
use ric_edge_shared::envelope::{CallKind, Request};
use ric_edge_shared::template::{self, ConfigLookup, Substitution};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// A request ready for dispatch
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    /// Bytes sent to the connector
    pub payload: Bytes,
    /// The parsed envelope, id always set to a string
    pub request: Request,
}

pub(crate) fn prepare_request(
    payload: &[u8],
    config: &impl ConfigLookup,
    max_substitutions: usize,
    actions: &dyn ActionRegistry,
) -> Result<PreparedRequest, CallError> {
    let Substitution {
        payload: filled,
        mut changed,
    } = template::substitute_bounded(payload, config, max_substitutions)?;

    let mut request: Request = serde_json::from_slice(&filled)?;

    match &request.id {
        Some(Value::String(_)) => {}
        None | Some(Value::Null) => {
            request.id = Some(Value::String(Uuid::new_v4().to_string()));
            changed = true;
        }
        Some(other) => return Err(CallError::BadIdType(other.clone())),
    }

    if request.kind() == CallKind::Write {
        changed |= apply_write_action(&mut request, actions);
    }

    // A parsed envelope always encodes; a failure is reported as a parse error
    let payload = if changed {
        Bytes::from(serde_json::to_vec(&request)?)
    } else {
        Bytes::from(filled)
    };

    Ok(PreparedRequest { payload, request })
}

/// Replace `params.value` with the write transform output
fn apply_write_action(request: &mut Request, actions: &dyn ActionRegistry) -> bool {
    let Some(parent) = request.parent().map(str::to_owned) else {
        return false;
    };
    let Some(params) = request.params_mut() else {
        return false;
    };

    let input = params.value.clone().unwrap_or(Value::Null);
    match actions.execute(&write_action(&parent), input.into()) {
        Ok(Some(output)) => {
            params.value = Some(output.into_json());
            true
        }
        Ok(None) => false,
        Err(e) => {
            debug!(parent = parent.as_str(), error = %e, "Write action skipped");
            false
        }
    }
}
