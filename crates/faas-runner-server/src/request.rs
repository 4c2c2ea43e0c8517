//! JSON request bodies.
//!
//! Field names follow the camelCase wire format of the HTTP API. Required
//! fields are optional here so that a missing field is reported as a 400
//! with a message instead of an extractor rejection.

use serde::Deserialize;

use faas_runner_common::{FunctionId, NewFunction};

/// Body of `POST /execute`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub function_id: Option<FunctionId>,
    /// Sandbox hint, `default` or `gvisor`.
    #[serde(default)]
    pub runtime: Option<String>,
}

/// Body of `POST /submit-function`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitFunctionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub route: Option<String>,
    pub language: Option<String>,
    pub timeout: Option<u32>,
}

impl SubmitFunctionRequest {
    /// Convert into a definition. Missing fields become empty and are
    /// caught by [`NewFunction::validate`].
    pub fn into_new_function(self) -> NewFunction {
        NewFunction {
            title: self.title.unwrap_or_default(),
            description: self.description,
            code: self.code.unwrap_or_default(),
            route: self.route.unwrap_or_default(),
            language: self.language.unwrap_or_default(),
            timeout: self.timeout.unwrap_or_default(),
        }
    }
}
