//! Function metadata and execution metric storage.
//!
//! This module provides:
//! - [`FunctionStore`]: Lookup and management of function definitions
//! - [`MetricsStore`]: Append-only sink for [`ExecutionMetric`] rows
//! - [`InMemoryFunctionStore`] and [`InMemoryMetricsStore`]: Process-local
//!   implementations
//!
//! The core only reads functions and appends metrics. Any persistent store
//! can be plugged in by implementing the traits.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use faas_runner_common::{
    ExecutionMetric, FunctionId, FunctionRecord, FunctionUpdate, MetricsSummary, NewFunction,
    StoreError,
};

/// Storage of function definitions.
#[async_trait]
pub trait FunctionStore: Send + Sync {
    /// Look up a function. A missing function is `Ok(None)`.
    async fn get_function(&self, id: FunctionId) -> Result<Option<FunctionRecord>, StoreError>;

    /// Store a new function and return it with its assigned identifier.
    async fn create_function(&self, function: NewFunction) -> Result<FunctionRecord, StoreError>;

    /// All functions, ordered by identifier.
    async fn list_functions(&self) -> Result<Vec<FunctionRecord>, StoreError>;

    /// Apply an update and return the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such function exists.
    async fn update_function(
        &self,
        id: FunctionId,
        update: FunctionUpdate,
    ) -> Result<FunctionRecord, StoreError>;

    /// Delete a function.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such function exists.
    async fn delete_function(&self, id: FunctionId) -> Result<(), StoreError>;
}

/// Append-only storage of execution metrics.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn record_metric(&self, metric: ExecutionMetric) -> Result<(), StoreError>;

    /// Aggregates per `(function_id, runtime)`, ordered by that pair.
    async fn summary(&self) -> Result<Vec<MetricsSummary>, StoreError>;
}

/// Function store held in process memory. Identifiers start at 1.
#[derive(Debug)]
pub struct InMemoryFunctionStore {
    next_id: AtomicU64,
    functions: DashMap<FunctionId, FunctionRecord>,
}

impl InMemoryFunctionStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            functions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for InMemoryFunctionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FunctionStore for InMemoryFunctionStore {
    async fn get_function(&self, id: FunctionId) -> Result<Option<FunctionRecord>, StoreError> {
        Ok(self.functions.get(&id).map(|f| f.clone()))
    }

    async fn create_function(&self, function: NewFunction) -> Result<FunctionRecord, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = function.into_record(id);
        self.functions.insert(id, record.clone());
        Ok(record)
    }

    async fn list_functions(&self) -> Result<Vec<FunctionRecord>, StoreError> {
        let mut functions: Vec<FunctionRecord> =
            self.functions.iter().map(|f| f.value().clone()).collect();
        functions.sort_by_key(|f| f.id);
        Ok(functions)
    }

    async fn update_function(
        &self,
        id: FunctionId,
        update: FunctionUpdate,
    ) -> Result<FunctionRecord, StoreError> {
        let mut entry = self
            .functions
            .get_mut(&id)
            .ok_or(StoreError::NotFound { function_id: id })?;
        update.apply(&mut entry);
        Ok(entry.clone())
    }

    async fn delete_function(&self, id: FunctionId) -> Result<(), StoreError> {
        self.functions
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { function_id: id })
    }
}

/// Metrics store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    metrics: RwLock<Vec<ExecutionMetric>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded metrics, in insertion order.
    pub fn metrics(&self) -> Vec<ExecutionMetric> {
        self.metrics.read().clone()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn record_metric(&self, metric: ExecutionMetric) -> Result<(), StoreError> {
        self.metrics.write().push(metric);
        Ok(())
    }

    async fn summary(&self) -> Result<Vec<MetricsSummary>, StoreError> {
        #[derive(Default)]
        struct Totals {
            runs: u64,
            duration_ms: u64,
            errors: u64,
        }

        let mut groups: BTreeMap<(FunctionId, String), Totals> = BTreeMap::new();
        for metric in self.metrics.read().iter() {
            let totals = groups
                .entry((metric.function_id, metric.runtime.clone()))
                .or_default();
            totals.runs += 1;
            totals.duration_ms = totals.duration_ms.saturating_add(metric.duration_ms);
            if !metric.success {
                totals.errors += 1;
            }
        }

        Ok(groups
            .into_iter()
            .map(|((function_id, runtime), totals)| MetricsSummary {
                function_id,
                runtime,
                total_runs: totals.runs,
                avg_duration: totals.duration_ms as f64 / totals.runs as f64,
                error_count: totals.errors,
            })
            .collect())
    }
}
