//! Model interactions: recurring jobs and one-shot subscriptions

use super::{BootstrapError, Interceptor};
use crate::cloud::ActionConfig;
use crate::scheduler::Job;
use bytes::Bytes;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const SCHEDULE: &str = "schedule";
pub const SUBSCRIBE: &str = "subscribe";

impl Interceptor {
    /// Start every interaction in declaration order
    ///
    /// Stops at the first failure; interactions started before it keep
    /// running.
    pub(super) fn spawn_jobs(&self) -> Result<(), BootstrapError> {
        for config in &self.inner.model.interactions {
            match config.kind.as_str() {
                SCHEDULE => {
                    let handle = self
                        .inner
                        .scheduler
                        .add_func(&config.interval, self.job(config))
                        .map_err(|source| BootstrapError::Schedule {
                            id: config.id.clone(),
                            source,
                        })?;
                    self.inner.jobs.lock().push(handle);
                    info!("Scheduled {} as {} ({})", config.id, handle, config.interval);
                }
                SUBSCRIBE => {
                    let this = self.clone();
                    let config = config.clone();
                    tokio::spawn(async move { this.subscribe(&config).await });
                }
                other => {
                    return Err(BootstrapError::UnknownType {
                        id: config.id.clone(),
                        kind: other.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Job body for a scheduled interaction
    ///
    /// Holds the pipeline weakly so a forgotten job cannot keep it alive.
    fn job(&self, config: &ActionConfig) -> Job {
        let inner = Arc::downgrade(&self.inner);
        let id = config.id.clone();
        let connector = config.connector.clone();
        let payload = Bytes::from(config.payload.to_bytes());

        Arc::new(move || {
            let inner = inner.clone();
            let id = id.clone();
            let connector = connector.clone();
            let payload = payload.clone();

            async move {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                let response = Interceptor { inner }.call(&connector, &payload).await;
                debug!("Job {} response: {}", id, String::from_utf8_lossy(&response));
            }
            .boxed()
        })
    }

    /// Dispatch a subscription request once and log the device process id
    async fn subscribe(&self, config: &ActionConfig) {
        let response = self.call(&config.connector, &config.payload.to_bytes()).await;

        let process_id = serde_json::from_slice::<Value>(&response)
            .ok()
            .and_then(|v| v.get("result")?.get("process_id").cloned());

        match process_id {
            Some(Value::String(pid)) => info!("Subscription {} started, process_id {}", config.id, pid),
            Some(pid) => info!("Subscription {} started, process_id {}", config.id, pid),
            None => error!(
                "Subscription {}: process_id not found in {}",
                config.id,
                String::from_utf8_lossy(&response)
            ),
        }
    }
}
