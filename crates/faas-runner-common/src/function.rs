//! Function metadata and execution metric records.

use serde::{Deserialize, Serialize};

use crate::RunnerError;

/// Identifier of a stored function.
pub type FunctionId = u64;

/// A stored function definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FunctionRecord {
    /// Store-assigned identifier.
    pub id: FunctionId,
    /// Display title.
    pub title: String,
    /// Display description.
    #[serde(default)]
    pub description: Option<String>,
    /// Source code of the function.
    pub code: String,
    /// Invocation path. Not interpreted by the core.
    pub route: String,
    /// Declared language, as submitted.
    pub language: String,
    /// Wall-clock execution limit in seconds.
    pub timeout: u32,
}

/// A function definition that has not been stored yet.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewFunction {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub code: String,
    pub route: String,
    pub language: String,
    pub timeout: u32,
}

impl NewFunction {
    /// Check that every required field is present.
    pub fn validate(&self) -> Result<(), RunnerError> {
        let missing: Vec<&str> = [
            ("title", self.title.trim().is_empty()),
            ("code", self.code.trim().is_empty()),
            ("route", self.route.trim().is_empty()),
            ("language", self.language.trim().is_empty()),
            ("timeout", self.timeout == 0),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::invalid_function(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Attach an identifier, producing the stored record.
    pub fn into_record(self, id: FunctionId) -> FunctionRecord {
        FunctionRecord {
            id,
            title: self.title,
            description: self.description,
            code: self.code,
            route: self.route,
            language: self.language,
            timeout: self.timeout,
        }
    }
}

/// Partial update of a stored function. Only display fields and code change.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FunctionUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl FunctionUpdate {
    /// Apply the update to a record in place.
    pub fn apply(self, record: &mut FunctionRecord) {
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(description) = self.description {
            record.description = Some(description);
        }
        if let Some(code) = self.code {
            record.code = code;
        }
    }
}

/// One row per execution attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionMetric {
    pub function_id: FunctionId,
    /// Declared language of the function.
    pub language: String,
    /// Sandbox variant used (`default` or `gvisor`).
    pub runtime: String,
    pub duration_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Aggregated view of metrics for one `(function_id, runtime)` pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetricsSummary {
    pub function_id: FunctionId,
    pub runtime: String,
    pub total_runs: u64,
    pub avg_duration: f64,
    pub error_count: u64,
}
