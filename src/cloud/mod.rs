//! Cloud-side description of the managed device
//!
//! The edge object and its model are loaded once when the interceptor is
//! constructed and are read-only afterwards.

mod api;
mod model;

pub use api::{CloudApi, FileApi};
pub use model::{ActionConfig, EdgeObject, Model, ModelAction, PayloadTemplate};
