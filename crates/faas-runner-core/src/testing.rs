//! Scripted container backend for tests.
//!
//! [`FakeBackend`] keeps images and containers in memory and "runs" function
//! code by reading it from the mounted host directory and interpreting a tiny
//! subset of it:
//!
//! - `print('x')` / `console.log("x")` lines write `x` to stdout
//! - a `raise ...` / `throw ...` line exits 1 with the rest of the line on
//!   stderr
//! - code mentioning `sleep`, `while True` or `setTimeout` never finishes

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use faas_runner_common::ImageTag;

use crate::backend::{
    BackendError, BuildRequest, ContainerBackend, IdleContainerSpec, Mount, ProcessOutput,
    RunSpec, StartOutcome,
};

/// One function invocation seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub container: String,
    /// `exec` into an existing container rather than a fresh `run`.
    pub pooled: bool,
    pub oci_runtime: Option<String>,
    /// Code read from the mounted entrypoint.
    pub code: String,
}

#[derive(Debug)]
struct FakeContainer {
    running: bool,
    mounts: Vec<Mount>,
}

#[derive(Debug, Default)]
struct FakeState {
    build_failure: Option<String>,
    builds: HashMap<String, usize>,
    images: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    started: Vec<String>,
    idle_specs: HashMap<String, IdleContainerSpec>,
    killed: Vec<String>,
    invocations: Vec<Invocation>,
}

/// In-memory [`ContainerBackend`].
#[derive(Debug, Default)]
pub struct FakeBackend {
    build_delay: Duration,
    run_delay: Duration,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every build takes `delay`.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    /// Every run and exec takes at least `delay`.
    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// Builds fail with `stderr` until [`FakeBackend::set_builds_failing`]
    /// clears it.
    pub fn with_failing_builds(mut self, stderr: &str) -> Self {
        self.state.get_mut().build_failure = Some(stderr.to_string());
        self
    }

    /// Treat `tag` as already built.
    pub fn with_built_image(mut self, tag: ImageTag) -> Self {
        self.state.get_mut().images.insert(tag.to_string());
        self
    }

    /// A running container named `name` exists before the test starts.
    pub fn with_existing_container(mut self, name: &str) -> Self {
        self.state.get_mut().containers.insert(
            name.to_string(),
            FakeContainer {
                running: true,
                mounts: Vec::new(),
            },
        );
        self
    }

    pub fn set_builds_failing(&self, stderr: Option<&str>) {
        self.state.lock().build_failure = stderr.map(str::to_string);
    }

    /// Number of build attempts for `tag`.
    pub fn build_count(&self, tag: &str) -> usize {
        self.state.lock().builds.get(tag).copied().unwrap_or(0)
    }

    /// Names of idle containers started by warm-ups, in start order.
    pub fn started_containers(&self) -> Vec<String> {
        self.state.lock().started.clone()
    }

    /// Last spec used to start the idle container `name`.
    pub fn idle_spec(&self, name: &str) -> Option<IdleContainerSpec> {
        self.state.lock().idle_specs.get(name).cloned()
    }

    /// Names of containers that exist (running or exited, not removed).
    pub fn live_containers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().containers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of containers that were killed while running.
    pub fn killed_containers(&self) -> Vec<String> {
        self.state.lock().killed.clone()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Stop a container as if it had crashed.
    pub fn crash_container(&self, name: &str) {
        if let Some(container) = self.state.lock().containers.get_mut(name) {
            container.running = false;
        }
    }

    async fn simulate(&self, host_path: Option<PathBuf>) -> ProcessOutput {
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }

        let code = match host_path.map(std::fs::read_to_string) {
            Some(Ok(code)) => code,
            _ => {
                return ProcessOutput {
                    stdout: String::new(),
                    stderr: "can't open file: No such file or directory".into(),
                    exit_code: Some(2),
                };
            }
        };

        if ["sleep", "while True", "setTimeout"]
            .iter()
            .any(|marker| code.contains(marker))
        {
            std::future::pending::<()>().await;
        }

        let mut stdout = String::new();
        for line in code.lines().map(str::trim) {
            if let Some(rest) = line
                .strip_prefix("raise ")
                .or_else(|| line.strip_prefix("throw "))
            {
                return ProcessOutput {
                    stdout,
                    stderr: format!("Uncaught error: {rest}\n"),
                    exit_code: Some(1),
                };
            }
            if let Some(arg) = line
                .strip_prefix("print(")
                .or_else(|| line.strip_prefix("console.log("))
                .and_then(|rest| rest.strip_suffix(')').or(rest.strip_suffix(");")))
            {
                stdout.push_str(arg.trim_matches(|c| c == '\'' || c == '"'));
                stdout.push('\n');
            }
        }

        ProcessOutput {
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

/// Map an in-container path to the host through `mounts`.
fn host_path(mounts: &[Mount], container_path: &str) -> Option<PathBuf> {
    mounts.iter().find_map(|mount| {
        let rest = container_path.strip_prefix(mount.container_path.as_str())?;
        Some(mount.host_path.join(rest.trim_start_matches('/')))
    })
}

fn failed(command: &str, exit_code: i32, stderr: impl Into<String>) -> BackendError {
    BackendError::CommandFailed {
        command: command.to_string(),
        exit_code: Some(exit_code),
        stderr: stderr.into(),
    }
}

#[async_trait]
impl ContainerBackend for FakeBackend {
    async fn build_image(&self, request: &BuildRequest) -> Result<(), BackendError> {
        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }

        let mut state = self.state.lock();
        let tag = request.tag.to_string();
        *state.builds.entry(tag.clone()).or_default() += 1;

        if let Some(stderr) = state.build_failure.clone() {
            return Err(failed("docker build", 1, stderr));
        }
        state.images.insert(tag);
        Ok(())
    }

    async fn start_idle_container(
        &self,
        spec: &IdleContainerSpec,
    ) -> Result<StartOutcome, BackendError> {
        let mut state = self.state.lock();
        if state.containers.contains_key(&spec.name) {
            return Ok(StartOutcome::AlreadyExists);
        }
        if !state.images.contains(spec.image.as_str()) {
            return Err(failed(
                "docker run",
                125,
                format!("Unable to find image '{}' locally", spec.image),
            ));
        }

        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                running: true,
                mounts: spec.mounts.clone(),
            },
        );
        state.started.push(spec.name.clone());
        state.idle_specs.insert(spec.name.clone(), spec.clone());
        Ok(StartOutcome::Started)
    }

    async fn run_container(&self, spec: &RunSpec) -> Result<ProcessOutput, BackendError> {
        let path = {
            let mut state = self.state.lock();
            if !state.images.contains(spec.image.as_str()) {
                return Err(failed(
                    "docker run",
                    125,
                    format!("Unable to find image '{}' locally", spec.image),
                ));
            }
            if state.containers.contains_key(&spec.name) {
                return Err(failed(
                    "docker run",
                    125,
                    format!("Conflict. The container name \"/{}\" is already in use", spec.name),
                ));
            }

            state.containers.insert(
                spec.name.clone(),
                FakeContainer {
                    running: true,
                    mounts: spec.mounts.clone(),
                },
            );
            let path = spec
                .command
                .last()
                .and_then(|entry| host_path(&spec.mounts, entry));
            state.invocations.push(Invocation {
                container: spec.name.clone(),
                pooled: false,
                oci_runtime: spec.oci_runtime.clone(),
                code: read_code(path.as_ref()),
            });
            path
        };

        let output = self.simulate(path).await;
        if let Some(container) = self.state.lock().containers.get_mut(&spec.name) {
            container.running = false;
        }
        Ok(output)
    }

    async fn exec_in_container(
        &self,
        container: &str,
        command: &[String],
    ) -> Result<ProcessOutput, BackendError> {
        let path = {
            let mut state = self.state.lock();
            let mounts = match state.containers.get(container) {
                Some(c) if c.running => c.mounts.clone(),
                _ => {
                    return Err(failed(
                        "docker exec",
                        1,
                        format!("Error response from daemon: container {container} is not running"),
                    ));
                }
            };
            let path = command.last().and_then(|entry| host_path(&mounts, entry));
            state.invocations.push(Invocation {
                container: container.to_string(),
                pooled: true,
                oci_runtime: None,
                code: read_code(path.as_ref()),
            });
            path
        };

        Ok(self.simulate(path).await)
    }

    async fn is_running(&self, container: &str) -> Result<bool, BackendError> {
        Ok(self
            .state
            .lock()
            .containers
            .get(container)
            .is_some_and(|c| c.running))
    }

    async fn kill_container(&self, container: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let killed = match state.containers.get_mut(container) {
            Some(c) if c.running => {
                c.running = false;
                true
            }
            _ => false,
        };
        if killed {
            state.killed.push(container.to_string());
        }
        Ok(())
    }

    async fn remove_container(&self, container: &str) -> Result<(), BackendError> {
        self.state.lock().containers.remove(container);
        Ok(())
    }
}

fn read_code(path: Option<&PathBuf>) -> String {
    path.and_then(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_default()
}
