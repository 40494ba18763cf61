use crate::actions::ActionError;
use crate::scheduler::SchedulerError;
use ric_edge_shared::{RpcError, TemplateError};
use serde_json::Value;
use thiserror::Error;

/// Why a call was answered with an error envelope instead of a connector reply
#[derive(Error, Debug)]
pub enum CallError {
    #[error("template: {0}")]
    Template(#[from] TemplateError),

    #[error("json unmarshal error: {0}")]
    Unmarshal(#[from] serde_json::Error),

    #[error("id should be string or null, got {0}")]
    BadIdType(Value),

    #[error("timeout")]
    Timeout,

    #[error("transport closed")]
    TransportClosed,
}

impl CallError {
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            CallError::Template(e) => unmarshal_error(e.to_string()),
            CallError::Unmarshal(e) => unmarshal_error(e.to_string()),
            CallError::BadIdType(id) => RpcError::internal()
                .with_data("msg", "id should be string or null")
                .with_data("current_id", id.clone()),
            CallError::Timeout => RpcError::server().with_data("msg", "timeout"),
            CallError::TransportClosed => RpcError::server().with_data("msg", "transport closed"),
        }
    }
}

fn unmarshal_error(err: String) -> RpcError {
    RpcError::parse()
        .with_data("msg", "json unmarshal error")
        .with_data("err", err)
}

/// Interceptor construction failures; all of them are fatal to the gateway
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("load edge object: {0:#}")]
    LoadObject(anyhow::Error),

    #[error("load model: {0:#}")]
    LoadModel(anyhow::Error),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("interaction {id}: {source}")]
    Schedule {
        id: String,
        #[source]
        source: SchedulerError,
    },

    #[error("interaction {id}: unknown type {kind:?}")]
    UnknownType { id: String, kind: String },
}
