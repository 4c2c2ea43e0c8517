//! Shared application state.
//!
//! This module provides [`AppState`], which holds shared resources
//! across all HTTP request handlers.

use std::sync::Arc;

use faas_runner_common::{RunnerError, RuntimeConfig};
use faas_runner_core::{
    ContainerBackend, Coordinator, FunctionStore, InMemoryFunctionStore, InMemoryMetricsStore,
    MetricsStore,
};

/// Shared state across all request handlers.
///
/// This struct is cloned for each request, so it uses `Arc` for shared data.
#[derive(Clone)]
pub struct AppState {
    /// Execution pipeline (shared across all requests).
    coordinator: Arc<Coordinator>,

    /// Function metadata, also read by the coordinator.
    functions: Arc<dyn FunctionStore>,

    /// Execution metrics, also written by the coordinator.
    metrics: Arc<dyn MetricsStore>,
}

impl AppState {
    /// Create application state over the given stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator cannot be initialized.
    pub fn new(
        config: &RuntimeConfig,
        backend: Arc<dyn ContainerBackend>,
        functions: Arc<dyn FunctionStore>,
        metrics: Arc<dyn MetricsStore>,
    ) -> Result<Self, RunnerError> {
        let coordinator = Coordinator::new(
            config,
            backend,
            Arc::clone(&functions),
            Arc::clone(&metrics),
        )?;

        Ok(Self {
            coordinator: Arc::new(coordinator),
            functions,
            metrics,
        })
    }

    /// Create application state with in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator cannot be initialized.
    pub fn in_memory(
        config: &RuntimeConfig,
        backend: Arc<dyn ContainerBackend>,
    ) -> Result<Self, RunnerError> {
        Self::new(
            config,
            backend,
            Arc::new(InMemoryFunctionStore::new()),
            Arc::new(InMemoryMetricsStore::new()),
        )
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn functions(&self) -> &dyn FunctionStore {
        self.functions.as_ref()
    }

    pub fn metrics(&self) -> &dyn MetricsStore {
        self.metrics.as_ref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use faas_runner_common::NewFunction;
    use faas_runner_core::testing::FakeBackend;

    use super::*;

    #[tokio::test]
    async fn test_stores_are_shared_with_coordinator() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.execution.work_dir = tmp.path().to_path_buf();

        let state = AppState::in_memory(&config, Arc::new(FakeBackend::new())).unwrap();
        let record = state
            .functions()
            .create_function(NewFunction {
                title: "hello".into(),
                description: None,
                code: "print('hi')".into(),
                route: "/hello".into(),
                language: "python".into(),
                timeout: 5,
            })
            .await
            .unwrap();

        let result = state.coordinator().execute(record.id, None).await.unwrap();
        assert_eq!(result.output.as_deref(), Some("hi"));
        assert_eq!(state.metrics().summary().await.unwrap().len(), 1);
    }
}
