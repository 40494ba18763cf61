//! ric-edge Shared Protocol Types
//!
//! This crate provides the wire types shared by the gateway core and its
//! connectors: the JSON-RPC style envelope, error envelopes, the payload
//! template engine and the binary/JSON codec exposed to transform scripts.

pub mod bridge;
pub mod envelope;
pub mod jsonrpc;
pub mod template;

pub use bridge::{BridgeError, Endian, NumberArg, Width};
pub use envelope::{ActionValue, CallKind, Params, Request, RequestParams, Response};
pub use jsonrpc::RpcError;
pub use template::{ConfigLookup, Substitution, TemplateError};

/// Default operating parameters for the gateway
pub mod defaults {
    /// Time a call waits for its connector response, in milliseconds
    pub const CALL_TIMEOUT_MS: u64 = 10_000;

    /// Capacity of the state broadcast and inbound notification queues
    pub const CHANNEL_CAPACITY: usize = 100;

    /// Upper bound on placeholder substitutions applied to a single payload
    pub const MAX_SUBSTITUTIONS: usize = 1024;

    /// Maximum operations a single action script may run
    pub const SCRIPT_MAX_OPERATIONS: u64 = 1_000_000;
}
