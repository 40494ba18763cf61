//! Outbound state updates
//!
//! Every successfully transformed device value is queued as a nested JSON
//! document (`edge.sensor.temp = 25` becomes `{"sensor":{"temp":25}}`). A
//! separate listener drains the queue into a [`StateSink`], which is where
//! a broker client would plug in.

use crate::state::nest;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use ric_edge_shared::envelope::state_key;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Producer side of the state queue
#[derive(Clone)]
pub struct StatePublisher {
    tx: mpsc::Sender<Bytes>,
}

impl StatePublisher {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Queue a state update; waits while the queue is full
    pub async fn send_state(&self, parent: &str, value: Value) {
        let update = nest(state_key(parent), value).to_string();
        debug!("State update for {}: {}", parent, update);

        if self.tx.send(Bytes::from(update)).await.is_err() {
            warn!("State queue closed, dropping update for {}", parent);
        }
    }
}

/// Destination of published state documents
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn publish(&self, payload: Bytes) -> Result<()>;
}

/// Writes state updates to the log
pub struct LogSink;

#[async_trait]
impl StateSink for LogSink {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        info!("State: {}", String::from_utf8_lossy(&payload));
        Ok(())
    }
}

/// Drain the state queue into `sink` until every producer is gone
///
/// A failed publish is logged and the listener moves on to the next update.
pub async fn publish_listener(mut rx: mpsc::Receiver<Bytes>, sink: Arc<dyn StateSink>) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = sink.publish(payload.clone()).await {
            error!(
                "Publish state {} failed: {:#}",
                String::from_utf8_lossy(&payload),
                e
            );
        }
    }
    info!("State queue closed, publish listener stopped");
}
