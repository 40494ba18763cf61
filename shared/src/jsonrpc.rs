//! JSON-RPC 2.0 error objects and error envelopes

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INTERNAL_ERROR: i64 = -32603;
pub const SERVER_ERROR: i64 = -32000;

/// JSON-RPC error object with free-form `data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn parse() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn internal() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }

    pub fn server() -> Self {
        Self::new(SERVER_ERROR, "Server error")
    }

    /// Attach a `data` entry, replacing any previous value under `key`
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Build a complete error envelope for the given request id
    pub fn error_response(&self, id: &str) -> Bytes {
        let envelope = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "error": self,
        });
        Bytes::from(envelope.to_string())
    }
}
