//! Warm pool of pre-started idle containers.
//!
//! The pool keeps up to `size` long-running idle containers per runtime so an
//! execution can `docker exec` into one instead of paying container start-up
//! latency. State is owned here rather than inferred from the engine:
//!
//! ```text
//!            warm_up                acquire
//!   (none) ──────────▶ Idle ───────────────────▶ Busy
//!                       ▲                          │
//!                       │ release (healthy)        │
//!                       └──────────────────────────┤
//!                                                  │ release (unhealthy) / retire
//!                                                  ▼
//!                                                Dead ──▶ replaced at next warm_up
//! ```
//!
//! Dead containers are not respawned until the next warm-up, so the pool can
//! shrink under failures. An exhausted pool is not an error: callers fall
//! back to a fresh, non-pooled container.
//!
//! Each runtime has its own lock, so runtimes never contend with each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use faas_runner_common::{ExecutionConfig, ImageTag, Runtime};

use crate::backend::{ContainerBackend, IdleContainerSpec, Mount, StartOutcome};

/// Lifecycle state of a pooled container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Idle,
    Busy,
    Dead,
}

/// A container tracked by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolContainer {
    pub name: String,
    pub runtime: Runtime,
    pub state: ContainerState,
}

/// Exclusive claim on a Busy pooled container.
///
/// A lease is not `Clone`; it must be handed back through
/// [`WarmPool::release`] or [`WarmPool::retire`].
#[derive(Debug, PartialEq, Eq)]
pub struct PoolLease {
    name: String,
    runtime: Runtime,
}

impl PoolLease {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }
}

/// Point-in-time counts for one runtime's pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub runtime: Runtime,
    pub idle: usize,
    pub busy: usize,
    pub dead: usize,
}

/// Deterministic name of the `index`-th (1-based) pooled container.
pub fn container_name(runtime: Runtime, index: usize) -> String {
    format!("pool_{}_{index}", runtime.as_str())
}

#[derive(Default)]
struct LanguagePool {
    containers: Mutex<Vec<PoolContainer>>,
}

/// Per-runtime pools of idle containers.
pub struct WarmPool {
    backend: Arc<dyn ContainerBackend>,
    pools: HashMap<Runtime, LanguagePool>,
    mounts: Vec<Mount>,
    network_disabled: bool,
    memory_limit_mb: Option<u32>,
}

impl WarmPool {
    /// Create an empty pool. `mounts` are attached to every container
    /// started at warm-up, which also gets the same network and memory
    /// limits as a fresh execution container.
    pub fn new(
        backend: Arc<dyn ContainerBackend>,
        mounts: Vec<Mount>,
        execution: &ExecutionConfig,
    ) -> Self {
        let pools = Runtime::ALL
            .into_iter()
            .map(|runtime| (runtime, LanguagePool::default()))
            .collect();
        Self {
            backend,
            pools,
            mounts,
            network_disabled: execution.network_disabled,
            memory_limit_mb: execution.memory_limit_mb,
        }
    }

    fn pool(&self, runtime: Runtime) -> &LanguagePool {
        // Every runtime gets a pool in `new`.
        &self.pools[&runtime]
    }

    /// Start idle containers for `runtime` until `size` live ones exist.
    ///
    /// Names are `pool_<runtime>_<i>` for `i` in `1..=size`; a name that is
    /// already Idle or Busy is skipped. A name collision in the engine
    /// counts as an existing container if it is running; a stopped one is
    /// removed and started again. Calling this again with the same size is
    /// therefore a no-op. Returns the number of Idle containers after
    /// warm-up.
    #[instrument(skip(self, image), fields(runtime = %runtime, image_tag = %image))]
    pub async fn warm_up(&self, runtime: Runtime, image: &ImageTag, size: usize) -> usize {
        for index in 1..=size {
            let name = container_name(runtime, index);
            if self.is_live(runtime, &name) {
                debug!(container = %name, "Pool container already live");
                continue;
            }

            let spec = IdleContainerSpec {
                name: name.clone(),
                image: image.clone(),
                mounts: self.mounts.clone(),
                network_disabled: self.network_disabled,
                memory_limit_mb: self.memory_limit_mb,
            };
            if self.start(&spec).await {
                self.mark_idle(runtime, &name);
            }
        }

        self.status(runtime).idle
    }

    /// Start one idle container. Returns whether a running container with
    /// that name exists afterwards.
    async fn start(&self, spec: &IdleContainerSpec) -> bool {
        let name = &spec.name;
        match self.backend.start_idle_container(spec).await {
            Ok(StartOutcome::Started) => {
                info!(container = %name, "Started pool container");
                return true;
            }
            Ok(StartOutcome::AlreadyExists) => {}
            Err(e) => {
                warn!(container = %name, error = %e, "Failed to start pool container");
                return false;
            }
        }

        match self.backend.is_running(name).await {
            Ok(true) => {
                info!(container = %name, "Pool container already exists");
                return true;
            }
            Ok(false) => warn!(container = %name, "Existing pool container is stopped, replacing it"),
            Err(e) => warn!(container = %name, error = %e, "Pool health check failed, replacing container"),
        }

        if let Err(e) = self.backend.remove_container(name).await {
            warn!(container = %name, error = %e, "Failed to remove stale pool container");
            return false;
        }
        match self.backend.start_idle_container(spec).await {
            Ok(StartOutcome::Started) => {
                info!(container = %name, "Restarted pool container");
                true
            }
            Ok(StartOutcome::AlreadyExists) => {
                warn!(container = %name, "Pool container name still in use after removal");
                false
            }
            Err(e) => {
                warn!(container = %name, error = %e, "Failed to start pool container");
                false
            }
        }
    }

    /// Claim an Idle container, or `None` if the pool is exhausted.
    pub fn acquire(&self, runtime: Runtime) -> Option<PoolLease> {
        let mut containers = self.pool(runtime).containers.lock();
        let container = containers
            .iter_mut()
            .find(|c| c.state == ContainerState::Idle)?;
        container.state = ContainerState::Busy;

        debug!(container = %container.name, "Acquired pool container");
        Some(PoolLease {
            name: container.name.clone(),
            runtime,
        })
    }

    /// Return a container to Idle if it is still running, otherwise retire it.
    pub async fn release(&self, lease: PoolLease) {
        let healthy = match self.backend.is_running(&lease.name).await {
            Ok(running) => running,
            Err(e) => {
                warn!(container = %lease.name, error = %e, "Pool health check failed");
                false
            }
        };

        if healthy {
            self.set_state(lease.runtime, &lease.name, ContainerState::Idle);
            debug!(container = %lease.name, "Released pool container");
        } else {
            self.retire(lease).await;
        }
    }

    /// Mark a container Dead and remove it from the engine. It is not
    /// replaced until the next warm-up.
    pub async fn retire(&self, lease: PoolLease) {
        self.set_state(lease.runtime, &lease.name, ContainerState::Dead);
        warn!(container = %lease.name, "Retired pool container");

        if let Err(e) = self.backend.remove_container(&lease.name).await {
            warn!(container = %lease.name, error = %e, "Failed to remove retired container");
        }
    }

    /// Counts for one runtime.
    pub fn status(&self, runtime: Runtime) -> PoolStatus {
        let containers = self.pool(runtime).containers.lock();
        let count = |state| containers.iter().filter(|c| c.state == state).count();
        PoolStatus {
            runtime,
            idle: count(ContainerState::Idle),
            busy: count(ContainerState::Busy),
            dead: count(ContainerState::Dead),
        }
    }

    /// Counts for every runtime.
    pub fn status_all(&self) -> Vec<PoolStatus> {
        Runtime::ALL.into_iter().map(|r| self.status(r)).collect()
    }

    /// Snapshot of the containers tracked for one runtime.
    pub fn containers(&self, runtime: Runtime) -> Vec<PoolContainer> {
        self.pool(runtime).containers.lock().clone()
    }

    fn is_live(&self, runtime: Runtime, name: &str) -> bool {
        self.pool(runtime)
            .containers
            .lock()
            .iter()
            .any(|c| c.name == name && c.state != ContainerState::Dead)
    }

    /// Insert `name` as Idle, or revive a Dead entry. Live entries are left
    /// untouched so a concurrent warm-up cannot steal a Busy container.
    fn mark_idle(&self, runtime: Runtime, name: &str) {
        let mut containers = self.pool(runtime).containers.lock();
        match containers.iter_mut().find(|c| c.name == name) {
            Some(c) if c.state == ContainerState::Dead => c.state = ContainerState::Idle,
            Some(_) => {}
            None => containers.push(PoolContainer {
                name: name.to_string(),
                runtime,
                state: ContainerState::Idle,
            }),
        }
    }

    fn set_state(&self, runtime: Runtime, name: &str, state: ContainerState) {
        let mut containers = self.pool(runtime).containers.lock();
        if let Some(c) = containers.iter_mut().find(|c| c.name == name) {
            c.state = state;
        }
    }
}

impl std::fmt::Debug for WarmPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmPool")
            .field("status", &self.status_all())
            .finish_non_exhaustive()
    }
}
