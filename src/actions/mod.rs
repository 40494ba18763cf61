//! Transform actions applied to values on their way to and from devices
//!
//! Actions are named `read.<parent>` or `write.<parent>` and come from the
//! device model. The interceptor only depends on [`ActionRegistry`]; the
//! scripting runtime behind it is replaceable.

mod script;

pub use script::ScriptActions;

use ric_edge_shared::ActionValue;
use thiserror::Error;

pub const READ_PREFIX: &str = "read.";
pub const WRITE_PREFIX: &str = "write.";

/// Registry name of the read transform for a parent path
pub fn read_action(parent: &str) -> String {
    format!("{}{}", READ_PREFIX, parent)
}

/// Registry name of the write transform for a parent path
pub fn write_action(parent: &str) -> String {
    format!("{}{}", WRITE_PREFIX, parent)
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("action {0} is not registered")]
    NotFound(String),

    #[error("compile action {name}: {reason}")]
    Compile { name: String, reason: String },

    #[error("run action {name}: {reason}")]
    Runtime { name: String, reason: String },

    #[error("convert value for action {name}: {reason}")]
    Conversion { name: String, reason: String },
}

/// Named transform scripts
pub trait ActionRegistry: Send + Sync {
    /// Compile and register `source` under `name`, replacing any previous one
    fn add(&self, name: &str, source: &str) -> Result<(), ActionError>;

    fn remove(&self, name: &str);

    /// Run the action; `Ok(None)` means the script produced no output
    fn execute(&self, name: &str, input: ActionValue) -> Result<Option<ActionValue>, ActionError>;
}
