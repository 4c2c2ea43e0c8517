//! Function execution inside containers.
//!
//! The [`ExecutionEngine`] runs one function invocation:
//!
//! 1. Resolve the declared language to a [`Runtime`]
//! 2. Materialize the code in a per-invocation work directory
//! 3. Run it in a pooled container (`exec`) or a fresh one (`run`), bounded
//!    by the function's timeout
//! 4. Classify the result and dispose of the container
//!
//! A timeout is enforced here, not by the function: when it elapses the
//! backend call is dropped (killing the local CLI process) and the container
//! itself is killed, so nothing keeps running. A pooled container that timed
//! out is retired, since processes exec'd into it cannot be stopped
//! individually.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Span, field, info, instrument, warn};
use uuid::Uuid;

use faas_runner_common::{
    ExecutionConfig, FunctionRecord, Language, RunnerError, Runtime, SandboxRuntime,
};

use crate::backend::{BackendError, ContainerBackend, ProcessOutput, RunSpec};
use crate::pool::{PoolLease, WarmPool};
use crate::workspace::{InvocationDir, Workspace};

/// Why an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The function's process exited non-zero, or was killed by a signal.
    NonZeroExit { exit_code: Option<i32> },
    /// The function ran past its timeout and was terminated.
    Timeout { timeout_secs: u32 },
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub execution_id: String,
    pub success: bool,
    /// Trimmed stdout.
    pub output: String,
    pub error_message: Option<String>,
    /// From invocation start to process exit; excludes image builds.
    pub duration_ms: u64,
    pub failure: Option<FailureKind>,
    /// Whether a warm pool container was used.
    pub pooled: bool,
}

impl ExecutionOutcome {
    fn completed(execution_id: String, output: ProcessOutput, elapsed: Duration, pooled: bool) -> Self {
        let success = output.success();
        let (error_message, failure) = if success {
            (None, None)
        } else {
            let stderr = output.stderr.trim();
            let message = if !stderr.is_empty() {
                stderr.to_string()
            } else if let Some(code) = output.exit_code {
                format!("Process exited with status {code}")
            } else {
                "Process terminated by signal".to_string()
            };
            (
                Some(message),
                Some(FailureKind::NonZeroExit {
                    exit_code: output.exit_code,
                }),
            )
        };

        Self {
            execution_id,
            success,
            output: output.stdout.trim().to_string(),
            error_message,
            duration_ms: duration_ms(elapsed),
            failure,
            pooled,
        }
    }

    fn timed_out(execution_id: String, timeout_secs: u32, elapsed: Duration, pooled: bool) -> Self {
        Self {
            execution_id,
            success: false,
            output: String::new(),
            error_message: Some(format!("Execution timed out after {timeout_secs}s")),
            duration_ms: duration_ms(elapsed),
            failure: Some(FailureKind::Timeout { timeout_secs }),
            pooled,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Timeout { .. }))
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Where an invocation runs.
enum Target {
    Pooled(PoolLease),
    Fresh(String),
}

/// Backend result of one invocation; `Err(Elapsed)` on timeout.
type RunResult = Result<Result<ProcessOutput, BackendError>, tokio::time::error::Elapsed>;

/// Runs functions in containers.
pub struct ExecutionEngine {
    backend: Arc<dyn ContainerBackend>,
    pool: Arc<WarmPool>,
    workspace: Workspace,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(
        backend: Arc<dyn ContainerBackend>,
        pool: Arc<WarmPool>,
        workspace: Workspace,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            backend,
            pool,
            workspace,
            config,
        }
    }

    /// Validate a function and map its language to a runtime.
    ///
    /// Fails with `InvalidFunction` if code or language is empty or the
    /// timeout is zero, and with `UnsupportedLanguage` if the language maps
    /// to no runtime.
    pub fn resolve_runtime(function: &FunctionRecord) -> Result<Runtime, RunnerError> {
        if function.language.trim().is_empty() || function.code.trim().is_empty() {
            return Err(RunnerError::invalid_function("Missing language or code"));
        }
        if function.timeout == 0 {
            return Err(RunnerError::invalid_function("Timeout must be at least 1 second"));
        }
        let language: Language = function.language.parse()?;
        Ok(language.runtime())
    }

    /// Execute `function` once.
    ///
    /// `lease`, if given, is a pooled container claimed by the caller; it is
    /// always handed back to the pool before this returns. Pooled containers
    /// run under the default runtime, so a sandboxed invocation never uses
    /// one.
    ///
    /// A pooled container the backend cannot exec into is retired and the
    /// invocation is retried once in a fresh container.
    ///
    /// The function's own failures (non-zero exit, timeout) are an `Ok`
    /// outcome with `success == false`. `Err` is returned only when the
    /// function could not be run at all.
    ///
    /// Cleanup happens at the end of this future, so dropping it mid-run
    /// leaks the container; callers that can be cancelled run it in a task.
    #[instrument(
        skip_all,
        fields(function_id = function.id, sandbox = %sandbox, execution_id = field::Empty)
    )]
    pub async fn run(
        &self,
        function: &FunctionRecord,
        sandbox: SandboxRuntime,
        lease: Option<PoolLease>,
    ) -> Result<ExecutionOutcome, RunnerError> {
        let runtime = match Self::resolve_runtime(function) {
            Ok(runtime) => runtime,
            Err(e) => {
                if let Some(lease) = lease {
                    self.pool.release(lease).await;
                }
                return Err(e);
            }
        };
        let lease = self.usable_lease(lease, runtime, sandbox).await;

        let execution_id = Uuid::new_v4().simple().to_string();
        Span::current().record("execution_id", execution_id.as_str());

        let dir = match self
            .workspace
            .materialize(&execution_id, runtime, &function.code)
            .await
        {
            Ok(dir) => dir,
            Err(e) => {
                if let Some(lease) = lease {
                    self.pool.release(lease).await;
                }
                return Err(e);
            }
        };

        let command = vec![
            runtime.interpreter().to_string(),
            dir.entrypoint().to_string(),
        ];
        let timeout = Duration::from_secs(u64::from(function.timeout));

        let mut start = Instant::now();
        let (target, result) = match lease {
            Some(lease) => {
                let result = tokio::time::timeout(
                    timeout,
                    self.backend.exec_in_container(lease.name(), &command),
                )
                .await;
                match result {
                    Ok(Err(e)) => {
                        warn!(
                            container = %lease.name(),
                            error = %e,
                            "Pooled container unusable, retrying in a fresh container"
                        );
                        self.pool.retire(lease).await;
                        start = Instant::now();
                        let spec = self.run_spec(&execution_id, runtime, sandbox, &dir, command);
                        self.run_fresh(spec, timeout).await
                    }
                    result => (Target::Pooled(lease), result),
                }
            }
            None => {
                let spec = self.run_spec(&execution_id, runtime, sandbox, &dir, command);
                self.run_fresh(spec, timeout).await
            }
        };
        let elapsed = start.elapsed();
        let pooled = matches!(target, Target::Pooled(_));

        let (outcome, terminate) = match result {
            Ok(Ok(output)) => (
                Ok(ExecutionOutcome::completed(
                    execution_id,
                    output,
                    elapsed,
                    pooled,
                )),
                false,
            ),
            Ok(Err(e)) => (Err(RunnerError::from(e)), false),
            Err(_) => {
                warn!(
                    timeout_secs = function.timeout,
                    "Execution timed out, terminating container"
                );
                (
                    Ok(ExecutionOutcome::timed_out(
                        execution_id,
                        function.timeout,
                        elapsed,
                        pooled,
                    )),
                    true,
                )
            }
        };

        self.dispose(target, terminate).await;
        dir.reclaim().await;

        if let Ok(outcome) = &outcome {
            info!(
                runtime = %runtime,
                pooled,
                success = outcome.success,
                duration_ms = outcome.duration_ms,
                "Execution finished"
            );
        }
        outcome
    }

    /// Drop a lease that cannot serve this invocation.
    async fn usable_lease(
        &self,
        lease: Option<PoolLease>,
        runtime: Runtime,
        sandbox: SandboxRuntime,
    ) -> Option<PoolLease> {
        let lease = lease?;
        if lease.runtime() == runtime && !sandbox.is_sandboxed() {
            return Some(lease);
        }
        warn!(
            container = %lease.name(),
            "Pooled container does not match the invocation, using a fresh container"
        );
        self.pool.release(lease).await;
        None
    }

    async fn run_fresh(&self, spec: RunSpec, timeout: Duration) -> (Target, RunResult) {
        let result = tokio::time::timeout(timeout, self.backend.run_container(&spec)).await;
        (Target::Fresh(spec.name), result)
    }

    fn run_spec(
        &self,
        execution_id: &str,
        runtime: Runtime,
        sandbox: SandboxRuntime,
        dir: &InvocationDir,
        command: Vec<String>,
    ) -> RunSpec {
        RunSpec {
            name: format!("fn_{runtime}_{execution_id}"),
            image: runtime.image_tag(),
            oci_runtime: sandbox
                .is_sandboxed()
                .then(|| self.config.gvisor_runtime.clone()),
            mounts: vec![dir.mount()],
            command,
            network_disabled: self.config.network_disabled,
            memory_limit_mb: self.config.memory_limit_mb,
        }
    }

    /// Hand a pooled container back, or remove a fresh one. `terminate`
    /// means the invocation may still be running.
    async fn dispose(&self, target: Target, terminate: bool) {
        match target {
            Target::Pooled(lease) if terminate => self.pool.retire(lease).await,
            Target::Pooled(lease) => self.pool.release(lease).await,
            Target::Fresh(name) => {
                if terminate {
                    if let Err(e) = self.backend.kill_container(&name).await {
                        warn!(container = %name, error = %e, "Failed to kill container");
                    }
                }
                if let Err(e) = self.backend.remove_container(&name).await {
                    warn!(container = %name, error = %e, "Failed to remove container");
                }
            }
        }
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("workspace", &self.workspace.root())
            .field("gvisor_runtime", &self.config.gvisor_runtime)
            .finish_non_exhaustive()
    }
}
