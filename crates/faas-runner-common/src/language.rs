//! Language, runtime and sandbox identifiers.
//!
//! A function declares a [`Language`] as free text. The declared language is
//! mapped onto a closed set of interpreter [`Runtime`]s, and every runtime owns
//! exactly one container image, identified by its [`ImageTag`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RunnerError;

/// A language a function may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Python source.
    Python,
    /// JavaScript source, accepted as `javascript`, `js` or `node`.
    JavaScript,
}

impl Language {
    /// Map the language onto the interpreter runtime that executes it.
    pub const fn runtime(self) -> Runtime {
        match self {
            Language::Python => Runtime::Python,
            Language::JavaScript => Runtime::Node,
        }
    }
}

impl FromStr for Language {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            _ => Err(RunnerError::unsupported_language(s)),
        }
    }
}

/// Interpreter runtime a function executes under.
///
/// Each runtime has one container image shared by all of its functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// CPython interpreter.
    Python,
    /// Node.js interpreter.
    Node,
}

impl Runtime {
    /// All supported runtimes.
    pub const ALL: [Runtime; 2] = [Runtime::Python, Runtime::Node];

    /// Short lowercase name, used in image tags and container names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Runtime::Python => "python",
            Runtime::Node => "node",
        }
    }

    /// Interpreter binary inside the image.
    pub const fn interpreter(self) -> &'static str {
        match self {
            Runtime::Python => "python",
            Runtime::Node => "node",
        }
    }

    /// File name the function code is materialized as.
    pub const fn entrypoint_file(self) -> &'static str {
        match self {
            Runtime::Python => "function.py",
            Runtime::Node => "function.js",
        }
    }

    /// File name of the build definition for this runtime.
    pub fn dockerfile_name(self) -> String {
        format!("Dockerfile.{}", self.as_str())
    }

    /// Deterministic image tag for this runtime.
    pub fn image_tag(self) -> ImageTag {
        ImageTag(format!("func-{}-image", self.as_str()))
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container runtime variant selected per invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SandboxRuntime {
    /// The container engine's standard runtime.
    #[default]
    Default,
    /// The gVisor hardened sandbox runtime.
    Gvisor,
}

impl SandboxRuntime {
    /// Parse a caller-supplied hint. Unknown or missing hints fall back to
    /// [`SandboxRuntime::Default`].
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(str::trim) {
            Some(h) if h.eq_ignore_ascii_case("gvisor") => SandboxRuntime::Gvisor,
            _ => SandboxRuntime::Default,
        }
    }

    /// Name recorded in metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            SandboxRuntime::Default => "default",
            SandboxRuntime::Gvisor => "gvisor",
        }
    }

    /// Returns `true` for the hardened sandbox.
    pub fn is_sandboxed(self) -> bool {
        self == SandboxRuntime::Gvisor
    }
}

impl fmt::Display for SandboxRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag of a built container image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTag(String);

impl ImageTag {
    /// The tag as passed to the container engine.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_aliases() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("Python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("js".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!(
            "javascript".parse::<Language>().unwrap(),
            Language::JavaScript
        );
        assert_eq!("node".parse::<Language>().unwrap(), Language::JavaScript);
    }

    #[test]
    fn test_unknown_language_is_unsupported() {
        let err = "ruby".parse::<Language>().unwrap_err();
        assert!(matches!(err, RunnerError::UnsupportedLanguage { .. }));
        assert!(err.to_string().contains("ruby"));
    }

    #[test]
    fn test_runtime_mapping() {
        assert_eq!(Language::Python.runtime(), Runtime::Python);
        assert_eq!(Language::JavaScript.runtime(), Runtime::Node);
    }

    #[test]
    fn test_image_tag() {
        assert_eq!(Runtime::Python.image_tag().as_str(), "func-python-image");
        assert_eq!(Runtime::Node.image_tag().to_string(), "func-node-image");
        assert_eq!(Runtime::Node.dockerfile_name(), "Dockerfile.node");
    }

    #[test]
    fn test_sandbox_hint() {
        assert_eq!(SandboxRuntime::from_hint(None), SandboxRuntime::Default);
        assert_eq!(
            SandboxRuntime::from_hint(Some("gvisor")),
            SandboxRuntime::Gvisor
        );
        assert_eq!(
            SandboxRuntime::from_hint(Some("kata")),
            SandboxRuntime::Default
        );
        assert_eq!(SandboxRuntime::Gvisor.as_str(), "gvisor");
    }
}
