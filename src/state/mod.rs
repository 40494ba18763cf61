//! Last-known device state mirror
//!
//! State is a JSON tree addressed by dotted path (`sensor.temp`). The
//! interceptor reads and writes one entry at a time; concurrency discipline
//! belongs to the store.

mod snapshot;

pub use snapshot::{load_snapshot, save_snapshot, SNAPSHOT_FILE};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("empty state path")]
    EmptyPath,

    #[error("cannot set {path}: {segment} is not an object")]
    NotAnObject { path: String, segment: String },
}

pub trait StateStore: Send + Sync {
    fn get(&self, path: &str) -> Option<Value>;

    fn set(&self, path: &str, value: Value) -> Result<(), StateError>;
}

/// In-memory state tree
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    root: RwLock<Map<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded from a previous snapshot
    ///
    /// With `clean_start` the snapshot is discarded.
    pub fn with_snapshot(snapshot: Map<String, Value>, clean_start: bool) -> Self {
        if clean_start {
            return Self::new();
        }
        Self {
            root: RwLock::new(snapshot),
        }
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Map<String, Value> {
        self.root.read().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, path: &str) -> Option<Value> {
        let root = self.root.read();
        let mut segments = path.split('.');
        let mut node = root.get(segments.next()?)?;
        for segment in segments {
            node = node.as_object()?.get(segment)?;
        }
        Some(node.clone())
    }

    fn set(&self, path: &str, value: Value) -> Result<(), StateError> {
        if path.is_empty() {
            return Err(StateError::EmptyPath);
        }

        let segments: Vec<&str> = path.split('.').collect();
        let (last, parents) = segments.split_last().ok_or(StateError::EmptyPath)?;

        let mut root = self.root.write();
        let mut node = &mut *root;
        for segment in parents {
            let child = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = match child {
                Value::Object(map) => map,
                _ => {
                    return Err(StateError::NotAnObject {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            };
        }
        node.insert(last.to_string(), value);
        Ok(())
    }
}

/// Build `{a: {b: value}}` from the dotted path `a.b`
pub fn nest(path: &str, value: Value) -> Value {
    path.rsplit('.')
        .fold(value, |inner, segment| {
            let mut map = Map::with_capacity(1);
            map.insert(segment.to_string(), inner);
            Value::Object(map)
        })
}
