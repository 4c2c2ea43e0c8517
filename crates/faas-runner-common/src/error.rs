//! Error types for faas-runner.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RunnerError`]: Top-level errors returned by the execution pipeline
//! - [`StoreError`]: Errors from the function metadata and metrics stores
//!
//! Failures of a function's own code are not errors. They are reported as a
//! failed execution outcome and still produce a metric.

use std::io;

use thiserror::Error;

use crate::function::FunctionId;

/// Top-level runner errors.
///
/// Variants fall in two groups: user errors, detected before any container
/// work and attributable to the caller or function author, and
/// infrastructure errors, attributable to the host.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// No function is stored under the given identifier.
    #[error("Function not found: {function_id}")]
    FunctionNotFound {
        /// The identifier that was looked up.
        function_id: FunctionId,
    },

    /// The function definition is unusable (missing code or language).
    #[error("Invalid function: {reason}")]
    InvalidFunction {
        /// Description of what is missing or malformed.
        reason: String,
    },

    /// The declared language maps to no runtime.
    #[error("Unsupported language: {language}")]
    UnsupportedLanguage {
        /// The language as declared by the function.
        language: String,
    },

    /// Building the runtime image failed.
    #[error("Image build failed for {tag}: {stderr}")]
    BuildFailed {
        /// The image tag that was being built.
        tag: String,
        /// Output of the build backend.
        stderr: String,
    },

    /// The container backend could not perform an operation.
    #[error("Container backend error during {operation}: {reason}")]
    Backend {
        /// The backend operation that failed.
        operation: String,
        /// Description of the failure.
        reason: String,
    },

    /// A store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Errors from the function metadata and metrics stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage backend could not be reached.
    #[error("Storage unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },

    /// The addressed function does not exist.
    #[error("No function with id {function_id}")]
    NotFound {
        /// The identifier that was addressed.
        function_id: FunctionId,
    },
}

impl RunnerError {
    /// Create a new `FunctionNotFound` error.
    pub fn function_not_found(function_id: FunctionId) -> Self {
        Self::FunctionNotFound { function_id }
    }

    /// Create a new `InvalidFunction` error.
    pub fn invalid_function(reason: impl Into<String>) -> Self {
        Self::InvalidFunction {
            reason: reason.into(),
        }
    }

    /// Create a new `UnsupportedLanguage` error.
    pub fn unsupported_language(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage {
            language: language.into(),
        }
    }

    /// Create a new `BuildFailed` error.
    pub fn build_failed(tag: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::BuildFailed {
            tag: tag.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a new `Backend` error.
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates the function was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FunctionNotFound { .. } | Self::Store(StoreError::NotFound { .. })
        )
    }

    /// Returns `true` for errors caused by the request or the function
    /// definition rather than the host.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::FunctionNotFound { .. }
                | Self::InvalidFunction { .. }
                | Self::UnsupportedLanguage { .. }
                | Self::Store(StoreError::NotFound { .. })
        )
    }

    /// Returns `true` for host-side failures.
    pub fn is_infrastructure(&self) -> bool {
        !self.is_user_error()
    }
}

impl StoreError {
    /// Create a new `Unavailable` error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RunnerError::function_not_found(42);
        assert_eq!(err.to_string(), "Function not found: 42");

        let err = RunnerError::unsupported_language("ruby");
        assert_eq!(err.to_string(), "Unsupported language: ruby");
    }

    #[test]
    fn test_error_from_store() {
        let store_err = StoreError::unavailable("connection refused");
        let runner_err: RunnerError = store_err.into();

        assert!(matches!(runner_err, RunnerError::Store(_)));
        assert!(runner_err.is_infrastructure());
    }

    #[test]
    fn test_user_errors() {
        assert!(RunnerError::function_not_found(1).is_user_error());
        assert!(RunnerError::invalid_function("no code").is_user_error());
        assert!(RunnerError::unsupported_language("ruby").is_user_error());
        assert!(!RunnerError::build_failed("func-python-image", "boom").is_user_error());
        assert!(RunnerError::backend("run", "docker missing").is_infrastructure());
    }

    #[test]
    fn test_is_not_found() {
        assert!(RunnerError::function_not_found(3).is_not_found());
        assert!(RunnerError::from(StoreError::NotFound { function_id: 3 }).is_not_found());
        assert!(!RunnerError::invalid_function("x").is_not_found());
    }
}
