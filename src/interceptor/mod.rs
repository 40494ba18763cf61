//! RPC interceptor between the gateway and its device connectors
//!
//! Every call goes through the same pipeline:
//! ```text
//! payload -> templates -> envelope checks -> write action -> connector
//!         <- state/publish <- read action <- response (or timeout)
//! ```
//! Device notifications that are not answers to a call take the read half of
//! the pipeline through the inbound listener.

mod bootstrap;
mod error;
mod listener;
mod request;
mod response;


pub use error::{BootstrapError, CallError};

use crate::actions::ActionRegistry;
use crate::cloud::{CloudApi, EdgeObject, Model};
use crate::config::GatewayConfig;
use crate::publisher::StatePublisher;
use crate::scheduler::{JobHandle, Scheduler};
use crate::state::StateStore;
use crate::transport::RpcTransport;
use bytes::Bytes;
use parking_lot::Mutex;
use ric_edge_shared::envelope::CallKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Everything the interceptor talks to
pub struct Collaborators {
    pub api: Arc<dyn CloudApi>,
    pub transport: Arc<dyn RpcTransport>,
    pub actions: Arc<dyn ActionRegistry>,
    pub state: Arc<dyn StateStore>,
    pub scheduler: Arc<dyn Scheduler>,
    /// Producer side of the state queue
    pub state_tx: mpsc::Sender<Bytes>,
    /// Device notifications not correlated with a pending call
    pub inbound_rx: mpsc::Receiver<Bytes>,
}

/// Cheap to clone; all clones share one pipeline
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn RpcTransport>,
    actions: Arc<dyn ActionRegistry>,
    state: Arc<dyn StateStore>,
    scheduler: Arc<dyn Scheduler>,
    publisher: StatePublisher,
    object: EdgeObject,
    model: Model,
    call_timeout: Duration,
    max_substitutions: usize,
    jobs: Mutex<Vec<JobHandle>>,
}

impl Interceptor {
    /// Load the edge object and model, register their actions, start the
    /// inbound listener and spawn the model's interactions
    pub async fn new(config: &GatewayConfig, deps: Collaborators) -> Result<Self, BootstrapError> {
        let object = deps
            .api
            .load_object(&config.edge_id)
            .await
            .map_err(BootstrapError::LoadObject)?;
        let model = deps
            .api
            .load_model(&object.model)
            .await
            .map_err(BootstrapError::LoadModel)?;

        for (name, source) in model.expressions() {
            deps.actions.add(&name, source)?;
            debug!("Registered action {}", name);
        }

        let inner = Arc::new(Inner {
            transport: deps.transport,
            actions: deps.actions,
            state: deps.state,
            scheduler: deps.scheduler,
            publisher: StatePublisher::new(deps.state_tx),
            object,
            model,
            call_timeout: config.call_timeout,
            max_substitutions: config.max_substitutions,
            jobs: Mutex::new(Vec::new()),
        });

        tokio::spawn(listener::run(inner.clone(), deps.inbound_rx));

        let interceptor = Self { inner };
        interceptor.spawn_jobs()?;

        info!(
            "Interceptor ready for {} (model {}, {} interactions)",
            interceptor.inner.object.id,
            interceptor.inner.model.id,
            interceptor.inner.model.interactions.len()
        );
        Ok(interceptor)
    }

    pub fn edge_id(&self) -> &str {
        &self.inner.object.id
    }

    /// Send `payload` to the connector `target` and return its reply
    ///
    /// Never fails: rejected requests, timeouts and closed links are all
    /// answered with a JSON-RPC error envelope.
    pub async fn call(&self, target: &str, payload: &[u8]) -> Bytes {
        let inner = &self.inner;
        let prepared = match request::prepare_request(
            payload,
            &inner.object.config,
            inner.max_substitutions,
            inner.actions.as_ref(),
        ) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Request to {} rejected: {}", target, e);
                return e.to_rpc_error().error_response("");
            }
        };

        let id = prepared.request.id_str().to_owned();
        let reply = inner.transport.call(target, &id, prepared.payload);

        match timeout(inner.call_timeout, reply).await {
            Ok(Ok(raw)) if prepared.request.kind() == CallKind::Read => {
                inner.prepare_response(&prepared.request, raw).await
            }
            Ok(Ok(raw)) => raw,
            Ok(Err(_)) => {
                warn!("Call {} to {}: transport closed", id, target);
                CallError::TransportClosed.to_rpc_error().error_response(&id)
            }
            Err(_) => {
                warn!("Call {} to {}: no reply within {:?}", id, target, inner.call_timeout);
                CallError::Timeout.to_rpc_error().error_response(&id)
            }
        }
    }

    /// Stop scheduled jobs and unregister the model's actions
    ///
    /// Subscriptions keep running.
    // TODO: cancel subscriptions and reload object and model so teardown can
    // be followed by a fresh bootstrap.
    pub fn undo_all(&self) {
        let jobs = std::mem::take(&mut *self.inner.jobs.lock());
        for handle in jobs {
            self.inner.scheduler.remove(handle);
            debug!("Removed {}", handle);
        }

        for (name, _) in self.inner.model.expressions() {
            self.inner.actions.remove(&name);
        }
        info!("Interceptor for {} torn down", self.inner.object.id);
    }
}
