//! Configuration file structures for faas-runner.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ServerConfigFile`]: HTTP server settings
//! - [`FunctionEntry`]: Function seeded into the metadata store at start-up

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;
use crate::function::NewFunction;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.builder]
/// docker_dir = "./docker"
///
/// [runtime.pool]
/// size = 2
/// languages = ["python", "node"]
///
/// [runtime.execution]
/// work_dir = "./executions"
/// gvisor_runtime = "runsc"
///
/// [server]
/// bind_addr = "0.0.0.0:5000"
///
/// [[functions]]
/// title = "hello"
/// route = "/hello"
/// language = "python"
/// timeout = 5
/// code = "print('hi')"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfigFile,

    /// Functions to store at startup.
    #[serde(default)]
    pub functions: Vec<FunctionEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// HTTP server configuration from config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,

    /// Request timeout in seconds.
    ///
    /// Must exceed the longest function timeout, or responses are cut off
    /// before the execution engine reports the timeout itself.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
        }
    }
}

/// A function entry to store at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionEntry {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub code: String,
    pub route: String,
    pub language: String,
    #[serde(default = "defaults::function_timeout")]
    pub timeout: u32,
}

impl From<FunctionEntry> for NewFunction {
    fn from(entry: FunctionEntry) -> Self {
        NewFunction {
            title: entry.title,
            description: entry.description,
            code: entry.code,
            route: entry.route,
            language: entry.language,
            timeout: entry.timeout,
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn bind_addr() -> String {
        "0.0.0.0:5000".to_string()
    }

    pub const fn request_timeout_secs() -> u64 {
        60
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }

    pub const fn function_timeout() -> u32 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Runtime;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.server.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.server.request_timeout_secs, 60);
        assert!(config.server.graceful_shutdown);
        assert!(config.functions.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:3000"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:3000");
        // Defaults applied
        assert_eq!(config.server.request_timeout_secs, 60);
        assert_eq!(config.runtime.pool.size, 2);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [runtime.builder]
            docker_dir = "/opt/faas/docker"
            context_dir = "/opt/faas"

            [runtime.pool]
            enabled = false
            size = 3
            languages = ["python"]

            [runtime.execution]
            work_dir = "/var/lib/faas/executions"
            gvisor_runtime = "runsc-debug"
            network_disabled = false
            memory_limit_mb = 256

            [runtime.metrics]
            record_timeout_ms = 100

            [runtime.backend]
            docker_bin = "podman"

            [server]
            bind_addr = "0.0.0.0:9000"
            request_timeout_secs = 120
            graceful_shutdown = false

            [[functions]]
            title = "hello"
            route = "/hello"
            language = "python"
            code = "print('hi')"

            [[functions]]
            title = "add"
            route = "/add"
            language = "js"
            timeout = 10
            code = "console.log(1 + 2)"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert!(!config.runtime.pool.enabled);
        assert_eq!(config.runtime.pool.size, 3);
        assert_eq!(config.runtime.pool.languages, vec![Runtime::Python]);
        assert_eq!(config.runtime.execution.gvisor_runtime, "runsc-debug");
        assert_eq!(config.runtime.execution.memory_limit_mb, Some(256));
        assert_eq!(config.runtime.metrics.record_timeout_ms, 100);
        assert_eq!(config.runtime.backend.docker_bin, "podman");
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert!(!config.server.graceful_shutdown);
        assert_eq!(config.functions.len(), 2);
        assert_eq!(config.functions[0].timeout, 5);
        assert_eq!(config.functions[1].timeout, 10);

        let seeded: NewFunction = config.functions[1].clone().into();
        assert_eq!(seeded.language, "js");
        tokio_test::assert_ok!(seeded.validate());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        tokio_test::assert_err!(result);
    }
}
