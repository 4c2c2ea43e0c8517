//! HTTP Server for faas-runner.
//!
//! This crate provides the HTTP interface for storing functions and
//! executing them in containers. It handles:
//!
//! - HTTP request routing
//! - Function metadata CRUD
//! - Execution requests and metrics summaries
//! - Health and readiness checks
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use faas_runner_common::RuntimeConfig;
//! use faas_runner_core::DockerCliBackend;
//! use faas_runner_server::{AppState, RunnerServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime_config = RuntimeConfig::default();
//!     let backend = Arc::new(DockerCliBackend::default());
//!     let state = AppState::in_memory(&runtime_config, backend)?;
//!
//!     RunnerServer::new(state, ServerConfig::default()).run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod functions;
pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use response::ApiError;
pub use server::{RunnerServer, ServerConfig, TestHandle};
pub use state::AppState;
