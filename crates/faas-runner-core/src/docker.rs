//! Docker CLI container backend.
//!
//! Each backend operation is one invocation of the `docker` binary through
//! [`tokio::process::Command`]. Child processes are spawned with
//! `kill_on_drop`, so cancelling an operation (for example when an execution
//! times out) kills the local client. Stopping the container itself is done
//! separately with [`ContainerBackend::kill_container`].

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::backend::{
    BackendError, BuildRequest, ContainerBackend, IdleContainerSpec, Mount, ProcessOutput,
    RunSpec, StartOutcome,
};

/// Exit code `docker run` uses when the daemon itself rejected the request.
const DOCKER_DAEMON_ERROR: i32 = 125;
/// The command exists in the container but cannot be invoked.
const COMMAND_NOT_INVOKABLE: i32 = 126;
/// The command does not exist in the container.
const COMMAND_NOT_FOUND: i32 = 127;

/// Container backend driving the Docker (or a compatible) CLI.
#[derive(Debug, Clone)]
pub struct DockerCliBackend {
    docker_bin: String,
}

impl DockerCliBackend {
    /// Create a backend invoking the given CLI binary (e.g. `docker`, `podman`).
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    async fn invoke(&self, args: &[String]) -> Result<ProcessOutput, BackendError> {
        debug!(command = %self.describe(args), "Invoking container CLI");

        let output = Command::new(&self.docker_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| BackendError::Spawn {
                command: self.describe(args),
                source,
            })?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    /// Invoke and turn a non-zero exit into [`BackendError::CommandFailed`].
    async fn invoke_checked(&self, args: &[String]) -> Result<ProcessOutput, BackendError> {
        let output = self.invoke(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.failed(args, output))
        }
    }

    fn failed(&self, args: &[String], output: ProcessOutput) -> BackendError {
        BackendError::CommandFailed {
            command: self.describe(args),
            exit_code: output.exit_code,
            stderr: output.stderr,
        }
    }

    /// Command name for errors and logs: binary plus subcommand.
    fn describe(&self, args: &[String]) -> String {
        match args.first() {
            Some(sub) => format!("{} {sub}", self.docker_bin),
            None => self.docker_bin.clone(),
        }
    }
}

impl Default for DockerCliBackend {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Whether stderr reports a daemon-side failure rather than command output.
fn is_daemon_error(stderr: &str) -> bool {
    stderr.trim_start().starts_with("Error response from daemon")
}

/// Exit codes with which `docker run` and `docker exec` report that the
/// command never ran.
fn is_launch_failure(exit_code: Option<i32>) -> bool {
    matches!(
        exit_code,
        Some(DOCKER_DAEMON_ERROR | COMMAND_NOT_INVOKABLE | COMMAND_NOT_FOUND)
    )
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("is not running")
}

/// Isolation and mount options shared by fresh and pooled containers.
fn push_limits(args: &mut Vec<String>, network_disabled: bool, memory_limit_mb: Option<u32>) {
    if network_disabled {
        args.extend(["--network".to_string(), "none".to_string()]);
    }
    if let Some(limit) = memory_limit_mb {
        args.extend(["--memory".to_string(), format!("{limit}m")]);
    }
}

fn push_mounts(args: &mut Vec<String>, mounts: &[Mount]) {
    for mount in mounts {
        args.extend(["-v".to_string(), mount.to_volume_arg()]);
    }
}

fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--name".to_string(), spec.name.clone()];

    if let Some(runtime) = &spec.oci_runtime {
        args.push(format!("--runtime={runtime}"));
    }
    push_limits(&mut args, spec.network_disabled, spec.memory_limit_mb);
    push_mounts(&mut args, &spec.mounts);

    args.push(spec.image.to_string());
    args.extend(spec.command.iter().cloned());
    args
}

fn idle_args(spec: &IdleContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    push_limits(&mut args, spec.network_disabled, spec.memory_limit_mb);
    push_mounts(&mut args, &spec.mounts);
    args.push(spec.image.to_string());
    args.extend(["tail", "-f", "/dev/null"].map(String::from));
    args
}

#[async_trait]
impl ContainerBackend for DockerCliBackend {
    #[instrument(skip(self, request), fields(image_tag = %request.tag))]
    async fn build_image(&self, request: &BuildRequest) -> Result<(), BackendError> {
        let args = vec![
            "build".to_string(),
            "-f".to_string(),
            request.dockerfile.display().to_string(),
            "-t".to_string(),
            request.tag.to_string(),
            request.context_dir.display().to_string(),
        ];
        self.invoke_checked(&args).await.map(|_| ())
    }

    #[instrument(skip(self, spec), fields(container = %spec.name))]
    async fn start_idle_container(
        &self,
        spec: &IdleContainerSpec,
    ) -> Result<StartOutcome, BackendError> {
        let args = idle_args(spec);
        let output = self.invoke(&args).await?;

        if output.success() {
            Ok(StartOutcome::Started)
        } else if output.stderr.contains("is already in use") {
            Ok(StartOutcome::AlreadyExists)
        } else {
            Err(self.failed(&args, output))
        }
    }

    async fn run_container(&self, spec: &RunSpec) -> Result<ProcessOutput, BackendError> {
        let args = run_args(spec);
        let output = self.invoke(&args).await?;

        if is_launch_failure(output.exit_code) {
            return Err(self.failed(&args, output));
        }
        Ok(output)
    }

    async fn exec_in_container(
        &self,
        container: &str,
        command: &[String],
    ) -> Result<ProcessOutput, BackendError> {
        let mut args = vec!["exec".to_string(), container.to_string()];
        args.extend(command.iter().cloned());
        let output = self.invoke(&args).await?;

        if is_launch_failure(output.exit_code) {
            return Err(self.failed(&args, output));
        }
        // A stopped container makes the CLI exit 1, the same status a
        // failing function would use. Only trust the daemon message when the
        // container is really gone.
        if !output.success()
            && is_daemon_error(&output.stderr)
            && !self.is_running(container).await.unwrap_or(false)
        {
            return Err(self.failed(&args, output));
        }
        Ok(output)
    }

    async fn is_running(&self, container: &str) -> Result<bool, BackendError> {
        let args = vec![
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            container.to_string(),
        ];
        let output = self.invoke(&args).await?;
        Ok(output.success() && output.stdout.trim() == "true")
    }

    async fn kill_container(&self, container: &str) -> Result<(), BackendError> {
        let args = vec!["kill".to_string(), container.to_string()];
        let output = self.invoke(&args).await?;

        if output.success() || is_missing_container(&output.stderr) {
            Ok(())
        } else {
            Err(self.failed(&args, output))
        }
    }

    async fn remove_container(&self, container: &str) -> Result<(), BackendError> {
        let args = vec!["rm".to_string(), "-f".to_string(), container.to_string()];
        let output = self.invoke(&args).await?;

        if output.success() || is_missing_container(&output.stderr) {
            Ok(())
        } else {
            Err(self.failed(&args, output))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use faas_runner_common::Runtime;

    use super::*;

    fn work_mount() -> Mount {
        Mount {
            host_path: PathBuf::from("/srv/exec/abc"),
            container_path: "/work/abc".into(),
            read_only: true,
        }
    }

    #[test]
    fn test_run_args_default_runtime() {
        let spec = RunSpec {
            name: "fn_python_abc".into(),
            image: Runtime::Python.image_tag(),
            oci_runtime: None,
            mounts: vec![work_mount()],
            command: vec!["python".into(), "/work/abc/function.py".into()],
            network_disabled: false,
            memory_limit_mb: None,
        };

        assert_eq!(
            run_args(&spec),
            vec![
                "run",
                "--name",
                "fn_python_abc",
                "-v",
                "/srv/exec/abc:/work/abc:ro",
                "func-python-image",
                "python",
                "/work/abc/function.py",
            ]
        );
    }

    #[test]
    fn test_run_args_sandboxed() {
        let spec = RunSpec {
            name: "fn_node_abc".into(),
            image: Runtime::Node.image_tag(),
            oci_runtime: Some("runsc".into()),
            mounts: vec![work_mount()],
            command: vec!["node".into(), "/work/abc/function.js".into()],
            network_disabled: true,
            memory_limit_mb: Some(128),
        };

        let args = run_args(&spec);
        assert!(args.contains(&"--runtime=runsc".to_string()));
        assert!(args.windows(2).any(|w| w == ["--network", "none"]));
        assert!(args.windows(2).any(|w| w == ["--memory", "128m"]));
        // Image comes after all options, command after the image.
        let image_pos = args.iter().position(|a| a == "func-node-image").unwrap();
        assert_eq!(args[image_pos + 1], "node");
    }

    #[test]
    fn test_idle_args() {
        let spec = IdleContainerSpec {
            name: "pool_python_1".into(),
            image: Runtime::Python.image_tag(),
            mounts: vec![],
            network_disabled: false,
            memory_limit_mb: None,
        };
        assert_eq!(
            idle_args(&spec),
            vec![
                "run",
                "-d",
                "--name",
                "pool_python_1",
                "func-python-image",
                "tail",
                "-f",
                "/dev/null",
            ]
        );
    }

    #[test]
    fn test_idle_args_carry_isolation_limits() {
        let spec = IdleContainerSpec {
            name: "pool_node_1".into(),
            image: Runtime::Node.image_tag(),
            mounts: vec![work_mount()],
            network_disabled: true,
            memory_limit_mb: Some(256),
        };

        let args = idle_args(&spec);
        assert!(args.windows(2).any(|w| w == ["--network", "none"]));
        assert!(args.windows(2).any(|w| w == ["--memory", "256m"]));
        let image_pos = args.iter().position(|a| a == "func-node-image").unwrap();
        assert!(args.iter().position(|a| a == "--network").unwrap() < image_pos);
        assert_eq!(&args[image_pos + 1..], ["tail", "-f", "/dev/null"]);
    }

    #[test]
    fn test_error_classification() {
        assert!(is_daemon_error(
            "Error response from daemon: container abc is not running"
        ));
        assert!(!is_daemon_error("Traceback (most recent call last):"));
        assert!(is_launch_failure(Some(125)));
        assert!(is_launch_failure(Some(127)));
        assert!(!is_launch_failure(Some(1)));
        assert!(!is_launch_failure(None));
        assert!(is_missing_container("Error: No such container: pool_node_1"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let backend = DockerCliBackend::new("definitely-not-a-container-cli");
        let err = backend.is_running("anything").await.unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }
}
