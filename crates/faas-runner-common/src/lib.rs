//! Common types, errors, and configuration for faas-runner.
//!
//! This crate provides shared functionality used across the faas-runner workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for runtime settings and config files
//! - Function, metric and language definitions

pub mod config;
pub mod config_file;
pub mod error;
pub mod function;
pub mod language;

pub use config::{
    BackendConfig, BuilderConfig, ExecutionConfig, MetricsConfig, PoolConfig, RuntimeConfig,
};
pub use config_file::{ConfigFile, ConfigFileError, FunctionEntry, ServerConfigFile};
pub use error::{RunnerError, StoreError};
pub use function::{
    ExecutionMetric, FunctionId, FunctionRecord, FunctionUpdate, MetricsSummary, NewFunction,
};
pub use language::{ImageTag, Language, Runtime, SandboxRuntime};
