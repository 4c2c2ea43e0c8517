//! Container backend abstraction.
//!
//! Everything the core needs from a container engine goes through the
//! [`ContainerBackend`] trait, so image, pool and execution state can be
//! exercised without a real engine. [`crate::DockerCliBackend`] is the
//! production implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use faas_runner_common::{ImageTag, RunnerError};

/// Inputs of an image build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Build definition file.
    pub dockerfile: PathBuf,
    /// Tag to assign to the built image.
    pub tag: ImageTag,
    /// Build context directory.
    pub context_dir: PathBuf,
}

/// A host directory made visible inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl Mount {
    /// Render as a `-v` volume argument.
    pub fn to_volume_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.host_path.display(), self.container_path);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// A long-lived idle container kept for the warm pool.
#[derive(Debug, Clone)]
pub struct IdleContainerSpec {
    pub name: String,
    pub image: ImageTag,
    pub mounts: Vec<Mount>,
    pub network_disabled: bool,
    pub memory_limit_mb: Option<u32>,
}

/// A one-shot container that runs a command and exits.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub name: String,
    pub image: ImageTag,
    /// OCI runtime to use instead of the engine default.
    pub oci_runtime: Option<String>,
    pub mounts: Vec<Mount>,
    pub command: Vec<String>,
    pub network_disabled: bool,
    pub memory_limit_mb: Option<u32>,
}

/// Result of starting an idle container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new container was started.
    Started,
    /// A container with that name already exists.
    AlreadyExists,
}

/// Captured output of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Returns `true` if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Container backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend command could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend command ran but reported a failure of its own.
    #[error("`{command}` failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl BackendError {
    /// Backend diagnostic output, or the error itself if there is none.
    pub fn detail(&self) -> String {
        match self {
            BackendError::CommandFailed { stderr, .. } if !stderr.trim().is_empty() => {
                stderr.trim().to_string()
            }
            other => other.to_string(),
        }
    }

    fn operation(&self) -> &str {
        match self {
            BackendError::Spawn { command, .. } | BackendError::CommandFailed { command, .. } => {
                command
            }
        }
    }
}

impl From<BackendError> for RunnerError {
    fn from(err: BackendError) -> Self {
        RunnerError::backend(err.operation().to_string(), err.detail())
    }
}

/// Operations the core performs against a container engine.
///
/// Implementations must be safe to call concurrently. Serialization of
/// builds and pool state is the caller's responsibility.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Build an image. Rebuilding with unchanged inputs must succeed.
    async fn build_image(&self, request: &BuildRequest) -> Result<(), BackendError>;

    /// Start a detached idle container. A name collision is reported as
    /// [`StartOutcome::AlreadyExists`], not as an error.
    async fn start_idle_container(
        &self,
        spec: &IdleContainerSpec,
    ) -> Result<StartOutcome, BackendError>;

    /// Run a one-shot container and wait for it to exit.
    ///
    /// A non-zero exit of the command is not an error; it is reported
    /// through [`ProcessOutput::exit_code`]. Dropping the returned future
    /// must stop waiting and release the local client process.
    async fn run_container(&self, spec: &RunSpec) -> Result<ProcessOutput, BackendError>;

    /// Run a command inside an existing container and wait for it to exit.
    async fn exec_in_container(
        &self,
        container: &str,
        command: &[String],
    ) -> Result<ProcessOutput, BackendError>;

    /// Whether the container exists and is running.
    async fn is_running(&self, container: &str) -> Result<bool, BackendError>;

    /// Send SIGKILL to the container's processes. Missing containers are
    /// not an error.
    async fn kill_container(&self, container: &str) -> Result<(), BackendError>;

    /// Force-remove a container. Missing containers are not an error.
    async fn remove_container(&self, container: &str) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_arg() {
        let mount = Mount {
            host_path: PathBuf::from("/srv/executions/abc"),
            container_path: "/work/abc".into(),
            read_only: true,
        };
        assert_eq!(mount.to_volume_arg(), "/srv/executions/abc:/work/abc:ro");

        let rw = Mount {
            read_only: false,
            ..mount
        };
        assert_eq!(rw.to_volume_arg(), "/srv/executions/abc:/work/abc");
    }

    #[test]
    fn test_backend_error_detail() {
        let err = BackendError::CommandFailed {
            command: "docker build".into(),
            exit_code: Some(1),
            stderr: "  no such file: Dockerfile.python\n".into(),
        };
        assert_eq!(err.detail(), "no such file: Dockerfile.python");

        let runner_err: RunnerError = err.into();
        assert!(matches!(runner_err, RunnerError::Backend { .. }));
        assert!(runner_err.to_string().contains("docker build"));
    }

    #[test]
    fn test_process_output_success() {
        let ok = ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        let killed = ProcessOutput::default();
        assert!(ok.success());
        assert!(!killed.success());
    }
}
