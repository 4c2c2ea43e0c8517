//! Execution coordinator.
//!
//! [`Coordinator::execute`] sequences one request through the pipeline:
//!
//! ```text
//! Fetched → ImageReady → ContainerAcquired → Ran → MetricRecorded → Responded
//! ```
//!
//! Requests that fail before `Ran` (unknown function, invalid definition,
//! unsupported language, failed build) end without a metric. Every request
//! that reaches `Ran` records exactly one metric, whether the function
//! succeeded or not.
//!
//! From `ContainerAcquired` on, the request runs in its own task. Dropping
//! the `execute` future (a client disconnect, for example) does not stop it:
//! the container is still disposed of and the metric still recorded.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, instrument, warn};

use faas_runner_common::{
    ExecutionMetric, FunctionId, PoolConfig, RunnerError, RuntimeConfig, SandboxRuntime,
};

use crate::backend::ContainerBackend;
use crate::engine::{ExecutionEngine, ExecutionOutcome};
use crate::image::ImageBuilder;
use crate::metrics::MetricsRecorder;
use crate::pool::WarmPool;
use crate::store::{FunctionStore, MetricsStore};
use crate::workspace::Workspace;

/// Stage of a request in the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Fetched,
    ImageReady,
    ContainerAcquired,
    Ran,
    MetricRecorded,
    Responded,
    NotFound,
    InvalidFunction,
    UnsupportedLanguage,
    BuildFailed,
}

impl ExecutionStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutionStage::Fetched => "fetched",
            ExecutionStage::ImageReady => "image_ready",
            ExecutionStage::ContainerAcquired => "container_acquired",
            ExecutionStage::Ran => "ran",
            ExecutionStage::MetricRecorded => "metric_recorded",
            ExecutionStage::Responded => "responded",
            ExecutionStage::NotFound => "not_found",
            ExecutionStage::InvalidFunction => "invalid_function",
            ExecutionStage::UnsupportedLanguage => "unsupported_language",
            ExecutionStage::BuildFailed => "build_failed",
        }
    }

    /// Terminal stage for an error raised before the function ran.
    fn for_error(err: &RunnerError) -> Option<Self> {
        match err {
            RunnerError::FunctionNotFound { .. } => Some(ExecutionStage::NotFound),
            RunnerError::InvalidFunction { .. } => Some(ExecutionStage::InvalidFunction),
            RunnerError::UnsupportedLanguage { .. } => Some(ExecutionStage::UnsupportedLanguage),
            RunnerError::BuildFailed { .. } => Some(ExecutionStage::BuildFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(function_id: FunctionId, stage: ExecutionStage) {
    debug!(function_id, stage = %stage, "Execution stage");
}

fn fail(function_id: FunctionId, err: &RunnerError) {
    if let Some(stage) = ExecutionStage::for_error(err) {
        enter(function_id, stage);
    }
}

/// What the calling layer receives for a completed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub function_id: FunctionId,
    /// Declared language of the function.
    pub language: String,
    pub runtime: SandboxRuntime,
    /// Trimmed stdout, set on success.
    pub output: Option<String>,
    /// Failure message, set on failure.
    pub error: Option<String>,
    pub duration_ms: u64,
    pub pooled: bool,
}

impl ExecutionResult {
    fn new(function_id: FunctionId, language: String, runtime: SandboxRuntime, outcome: ExecutionOutcome) -> Self {
        let (output, error) = if outcome.success {
            (Some(outcome.output), None)
        } else {
            (None, outcome.error_message)
        };
        Self {
            success: outcome.success,
            function_id,
            language,
            runtime,
            output,
            error,
            duration_ms: outcome.duration_ms,
            pooled: outcome.pooled,
        }
    }
}

/// Drives executions through the image builder, warm pool, engine and
/// metrics recorder.
pub struct Coordinator {
    functions: Arc<dyn FunctionStore>,
    images: ImageBuilder,
    pool: Arc<WarmPool>,
    engine: Arc<ExecutionEngine>,
    metrics: Arc<MetricsRecorder>,
    pool_config: PoolConfig,
}

impl Coordinator {
    /// Assemble the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution work directory cannot be created.
    pub fn new(
        config: &RuntimeConfig,
        backend: Arc<dyn ContainerBackend>,
        functions: Arc<dyn FunctionStore>,
        metrics: Arc<dyn MetricsStore>,
    ) -> Result<Self, RunnerError> {
        let workspace = Workspace::new(&config.execution.work_dir)?;
        let pool = Arc::new(WarmPool::new(
            Arc::clone(&backend),
            vec![workspace.shared_mount()],
            &config.execution,
        ));
        let images = ImageBuilder::new(Arc::clone(&backend), config.builder.clone());
        let engine = ExecutionEngine::new(
            backend,
            Arc::clone(&pool),
            workspace,
            config.execution.clone(),
        );

        info!(
            work_dir = %config.execution.work_dir.display(),
            pool_enabled = config.pool.enabled,
            pool_size = config.pool.size,
            "Coordinator initialized"
        );

        Ok(Self {
            functions,
            images,
            pool,
            engine: Arc::new(engine),
            metrics: Arc::new(MetricsRecorder::new(
                metrics,
                config.metrics.record_timeout(),
            )),
            pool_config: config.pool.clone(),
        })
    }

    /// Execute a stored function.
    ///
    /// `runtime_hint` selects the sandbox; only `"gvisor"` changes it.
    /// A function that fails or times out is an `Ok` result with
    /// `success == false`.
    #[instrument(skip(self, runtime_hint), fields(runtime_hint = runtime_hint.unwrap_or("default")))]
    pub async fn execute(
        &self,
        function_id: FunctionId,
        runtime_hint: Option<&str>,
    ) -> Result<ExecutionResult, RunnerError> {
        let function = match self.functions.get_function(function_id).await? {
            Some(function) => function,
            None => {
                let err = RunnerError::function_not_found(function_id);
                fail(function_id, &err);
                return Err(err);
            }
        };
        enter(function_id, ExecutionStage::Fetched);

        let runtime =
            ExecutionEngine::resolve_runtime(&function).inspect_err(|e| fail(function_id, e))?;
        let sandbox = SandboxRuntime::from_hint(runtime_hint);

        self.images
            .ensure_image(runtime)
            .await
            .inspect_err(|e| fail(function_id, e))?;
        enter(function_id, ExecutionStage::ImageReady);

        let lease = if self.pool_config.enabled && !sandbox.is_sandboxed() {
            let lease = self.pool.acquire(runtime);
            if lease.is_none() {
                debug!(function_id, runtime = %runtime, "Warm pool exhausted, using a fresh container");
            }
            lease
        } else {
            None
        };
        enter(function_id, ExecutionStage::ContainerAcquired);

        let language = function.language.clone();
        let engine = Arc::clone(&self.engine);
        let metrics = Arc::clone(&self.metrics);
        let run = tokio::spawn(
            async move {
                let outcome = engine.run(&function, sandbox, lease).await?;
                enter(function_id, ExecutionStage::Ran);

                metrics
                    .record(ExecutionMetric {
                        function_id,
                        language: function.language,
                        runtime: sandbox.as_str().to_string(),
                        duration_ms: outcome.duration_ms,
                        success: outcome.success,
                        error_message: outcome.error_message.clone(),
                    })
                    .await;
                enter(function_id, ExecutionStage::MetricRecorded);
                Ok::<_, RunnerError>(outcome)
            }
            .in_current_span(),
        );
        let outcome = run
            .await
            .map_err(|e| RunnerError::backend("execution task", e.to_string()))??;

        let result = ExecutionResult::new(function_id, language, sandbox, outcome);
        enter(function_id, ExecutionStage::Responded);
        Ok(result)
    }

    /// Build the image of every configured runtime and fill its pool.
    ///
    /// Failures are logged; warm-up never fails.
    #[instrument(skip(self))]
    pub async fn warm_up(&self) {
        for &runtime in &self.pool_config.languages {
            let tag = match self.images.ensure_image(runtime).await {
                Ok(tag) => tag,
                Err(e) => {
                    warn!(runtime = %runtime, error = %e, "Skipping warm-up, image unavailable");
                    continue;
                }
            };
            if !self.pool_config.enabled {
                continue;
            }
            let idle = self.pool.warm_up(runtime, &tag, self.pool_config.size).await;
            info!(runtime = %runtime, idle, "Warm pool ready");
        }
    }

    /// Run [`Coordinator::warm_up`] in the background.
    pub fn spawn_warm_up(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.warm_up().await })
    }

    pub fn pool(&self) -> &WarmPool {
        &self.pool
    }

    pub fn images(&self) -> &ImageBuilder {
        &self.images
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("images", &self.images)
            .field("pool", &self.pool)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_for_error() {
        assert_eq!(
            ExecutionStage::for_error(&RunnerError::function_not_found(1)),
            Some(ExecutionStage::NotFound)
        );
        assert_eq!(
            ExecutionStage::for_error(&RunnerError::unsupported_language("ruby")),
            Some(ExecutionStage::UnsupportedLanguage)
        );
        assert_eq!(
            ExecutionStage::for_error(&RunnerError::backend("docker run", "daemon down")),
            None
        );
    }

    #[test]
    fn test_result_carries_output_or_error() {
        let ok = ExecutionOutcome {
            execution_id: "a".into(),
            success: true,
            output: "hi".into(),
            error_message: None,
            duration_ms: 3,
            failure: None,
            pooled: false,
        };
        let result = ExecutionResult::new(1, "python".into(), SandboxRuntime::Default, ok);
        assert_eq!(result.output.as_deref(), Some("hi"));
        assert!(result.error.is_none());

        let failed = ExecutionOutcome {
            execution_id: "b".into(),
            success: false,
            output: "partial".into(),
            error_message: Some("boom".into()),
            duration_ms: 3,
            failure: None,
            pooled: true,
        };
        let result = ExecutionResult::new(1, "python".into(), SandboxRuntime::Default, failed);
        assert!(result.output.is_none());
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.pooled);
    }
}
