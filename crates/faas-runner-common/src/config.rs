//! Configuration structures for faas-runner.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`BuilderConfig`]: Where image build definitions live
//! - [`PoolConfig`]: Warm pool sizing
//! - [`ExecutionConfig`]: Per-invocation execution settings
//! - [`MetricsConfig`]: Metric recording behavior
//! - [`BackendConfig`]: Container engine CLI settings

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::language::Runtime;

/// Top-level runtime configuration.
///
/// This structure contains all configuration options for the runner.
/// It can be loaded from files (TOML, JSON) or built in code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Image build configuration.
    #[serde(default)]
    pub builder: BuilderConfig,

    /// Warm pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Per-invocation execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Metric recording configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Container engine configuration.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Image build configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuilderConfig {
    /// Directory containing one `Dockerfile.<runtime>` per runtime.
    #[serde(default = "defaults::docker_dir")]
    pub docker_dir: PathBuf,

    /// Build context passed to the container engine.
    #[serde(default = "defaults::context_dir")]
    pub context_dir: PathBuf,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            docker_dir: defaults::docker_dir(),
            context_dir: defaults::context_dir(),
        }
    }
}

impl BuilderConfig {
    /// Path of the build definition for a runtime.
    pub fn dockerfile_path(&self, runtime: Runtime) -> PathBuf {
        self.docker_dir.join(runtime.dockerfile_name())
    }
}

/// Warm pool configuration.
///
/// Pre-started idle containers let executions skip container start-up.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Whether executions may claim pooled containers.
    #[serde(default = "defaults::pool_enabled")]
    pub enabled: bool,

    /// Idle containers started per runtime at warm-up.
    #[serde(default = "defaults::pool_size")]
    pub size: usize,

    /// Runtimes to warm up.
    #[serde(default = "defaults::pool_languages")]
    pub languages: Vec<Runtime>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::pool_enabled(),
            size: defaults::pool_size(),
            languages: defaults::pool_languages(),
        }
    }
}

/// Per-invocation execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Host directory under which each invocation gets its own work directory.
    #[serde(default = "defaults::work_dir")]
    pub work_dir: PathBuf,

    /// OCI runtime name used when the `gvisor` hint is given.
    #[serde(default = "defaults::gvisor_runtime")]
    pub gvisor_runtime: String,

    /// Run fresh containers without network access.
    #[serde(default = "defaults::network_disabled")]
    pub network_disabled: bool,

    /// Memory limit for fresh containers in megabytes.
    #[serde(default)]
    pub memory_limit_mb: Option<u32>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            work_dir: defaults::work_dir(),
            gvisor_runtime: defaults::gvisor_runtime(),
            network_disabled: defaults::network_disabled(),
            memory_limit_mb: None,
        }
    }
}

/// Metric recording configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// How long an execution waits for its metric write before detaching it.
    #[serde(default = "defaults::record_timeout_ms")]
    pub record_timeout_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            record_timeout_ms: defaults::record_timeout_ms(),
        }
    }
}

impl MetricsConfig {
    /// Get the record timeout as a `Duration`.
    pub fn record_timeout(&self) -> Duration {
        Duration::from_millis(self.record_timeout_ms)
    }
}

/// Container engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Container engine CLI binary.
    #[serde(default = "defaults::docker_bin")]
    pub docker_bin: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            docker_bin: defaults::docker_bin(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    use std::path::PathBuf;

    use crate::language::Runtime;

    pub fn docker_dir() -> PathBuf {
        PathBuf::from("./docker")
    }

    pub fn context_dir() -> PathBuf {
        PathBuf::from(".")
    }

    pub const fn pool_enabled() -> bool {
        true
    }

    pub const fn pool_size() -> usize {
        2
    }

    pub fn pool_languages() -> Vec<Runtime> {
        Runtime::ALL.to_vec()
    }

    pub fn work_dir() -> PathBuf {
        PathBuf::from("./executions")
    }

    pub fn gvisor_runtime() -> String {
        "runsc".to_string()
    }

    pub const fn network_disabled() -> bool {
        true
    }

    pub const fn record_timeout_ms() -> u64 {
        500
    }

    pub fn docker_bin() -> String {
        "docker".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(config.pool.enabled);
        assert_eq!(config.pool.size, 2);
        assert_eq!(config.pool.languages, vec![Runtime::Python, Runtime::Node]);
        assert_eq!(config.execution.gvisor_runtime, "runsc");
        assert!(config.execution.network_disabled);
        assert_eq!(config.metrics.record_timeout_ms, 500);
        assert_eq!(config.backend.docker_bin, "docker");
    }

    #[test]
    fn test_config_serialization() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.pool.size, deserialized.pool.size);
        assert_eq!(config.execution.work_dir, deserialized.execution.work_dir);
    }

    #[test]
    fn test_dockerfile_path() {
        let config = BuilderConfig {
            docker_dir: PathBuf::from("/srv/docker"),
            ..Default::default()
        };

        assert_eq!(
            config.dockerfile_path(Runtime::Python),
            PathBuf::from("/srv/docker/Dockerfile.python")
        );
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"pool": {"size": 4, "languages": ["node"]}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.pool.size, 4);
        assert_eq!(config.pool.languages, vec![Runtime::Node]);
        // Defaults for unspecified fields
        assert!(config.pool.enabled);
        assert_eq!(config.metrics.record_timeout(), Duration::from_millis(500));
    }
}
