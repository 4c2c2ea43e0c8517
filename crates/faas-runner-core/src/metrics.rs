//! Execution metric recording.
//!
//! Recording is best-effort: a slow or failing metrics store never changes
//! the result of an execution. Each write runs in its own task; the caller
//! waits for it at most `record_timeout`, after which the write continues
//! detached.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use faas_runner_common::ExecutionMetric;

use crate::store::MetricsStore;

/// Writes one metric per execution to a [`MetricsStore`].
pub struct MetricsRecorder {
    store: Arc<dyn MetricsStore>,
    record_timeout: Duration,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn MetricsStore>, record_timeout: Duration) -> Self {
        Self {
            store,
            record_timeout,
        }
    }

    /// Record `metric`. Store failures are logged and swallowed.
    pub async fn record(&self, metric: ExecutionMetric) {
        let store = Arc::clone(&self.store);
        let function_id = metric.function_id;

        let write = tokio::spawn(async move {
            if let Err(e) = store.record_metric(metric).await {
                warn!(function_id, error = %e, "Failed to record execution metric");
            }
        });

        match tokio::time::timeout(self.record_timeout, write).await {
            Ok(Ok(())) => debug!(function_id, "Execution metric recorded"),
            Ok(Err(e)) => warn!(function_id, error = %e, "Metric write task failed"),
            Err(_) => debug!(
                function_id,
                timeout_ms = self.record_timeout.as_millis(),
                "Metric write still pending, continuing detached"
            ),
        }
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("record_timeout", &self.record_timeout)
            .finish_non_exhaustive()
    }
}
