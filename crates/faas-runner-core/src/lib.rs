//! Container orchestration core for faas-runner.
//!
//! This crate turns a stored function definition into a container run:
//! - [`ImageBuilder`]: Builds one shared image per runtime, single-flight
//! - [`WarmPool`]: Pre-started idle containers per runtime
//! - [`ExecutionEngine`]: Runs code in a pooled or fresh container under a timeout
//! - [`MetricsRecorder`]: Best-effort metric writes
//! - [`Coordinator`]: Sequences the above for one request
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Coordinator                         │
//! │  FunctionStore → ImageBuilder → WarmPool → Engine       │
//! │                                   → MetricsRecorder     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ContainerBackend                       │
//! │  (DockerCliBackend in production, FakeBackend in tests) │
//! │  - build / run / exec / kill / rm                       │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod coordinator;
pub mod docker;
pub mod engine;
pub mod image;
pub mod metrics;
pub mod pool;
pub mod store;
pub mod workspace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{
    BackendError, BuildRequest, ContainerBackend, IdleContainerSpec, Mount, ProcessOutput,
    RunSpec, StartOutcome,
};
pub use coordinator::{Coordinator, ExecutionResult, ExecutionStage};
pub use docker::DockerCliBackend;
pub use engine::{ExecutionEngine, ExecutionOutcome, FailureKind};
pub use image::ImageBuilder;
pub use metrics::MetricsRecorder;
pub use pool::{ContainerState, PoolContainer, PoolLease, PoolStatus, WarmPool};
pub use store::{
    FunctionStore, InMemoryFunctionStore, InMemoryMetricsStore, MetricsStore,
};
pub use workspace::{CONTAINER_WORK_ROOT, InvocationDir, Workspace};
