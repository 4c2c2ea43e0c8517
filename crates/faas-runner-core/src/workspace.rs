//! Per-invocation work directories.
//!
//! Every execution writes its code into its own directory under the
//! workspace root, keyed by the execution id, and the directory is reclaimed
//! once the run finishes. Concurrent executions therefore never share a code
//! file.
//!
//! Inside containers the workspace root is visible at [`CONTAINER_WORK_ROOT`]:
//! pooled containers mount the whole root, fresh containers mount only their
//! own invocation directory at the same in-container path.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use faas_runner_common::{RunnerError, Runtime};

use crate::backend::Mount;

/// Where the workspace root is mounted inside containers.
pub const CONTAINER_WORK_ROOT: &str = "/work";

/// Host directory that holds all invocation directories.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the workspace, creating the root directory if needed.
    ///
    /// The root is canonicalized because container engines require absolute
    /// host paths for bind mounts.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, RunnerError> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read-only mount of the whole workspace, used by pooled containers.
    pub fn shared_mount(&self) -> Mount {
        Mount {
            host_path: self.root.clone(),
            container_path: CONTAINER_WORK_ROOT.to_string(),
            read_only: true,
        }
    }

    /// Write `code` as the runtime's entrypoint file in a fresh directory.
    pub async fn materialize(
        &self,
        execution_id: &str,
        runtime: Runtime,
        code: &str,
    ) -> Result<InvocationDir, RunnerError> {
        let host_dir = self.root.join(execution_id);
        tokio::fs::create_dir(&host_dir).await?;

        let file_name = runtime.entrypoint_file();
        if let Err(e) = tokio::fs::write(host_dir.join(file_name), code).await {
            let _ = tokio::fs::remove_dir_all(&host_dir).await;
            return Err(e.into());
        }

        let container_dir = format!("{CONTAINER_WORK_ROOT}/{execution_id}");
        debug!(dir = %host_dir.display(), "Function code materialized");

        Ok(InvocationDir {
            entrypoint: format!("{container_dir}/{file_name}"),
            host_dir,
            container_dir,
        })
    }
}

/// The work directory of a single execution.
#[derive(Debug)]
pub struct InvocationDir {
    host_dir: PathBuf,
    container_dir: String,
    entrypoint: String,
}

impl InvocationDir {
    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    /// In-container path of the code file.
    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    /// Read-only mount of just this directory, used by fresh containers.
    pub fn mount(&self) -> Mount {
        Mount {
            host_path: self.host_dir.clone(),
            container_path: self.container_dir.clone(),
            read_only: true,
        }
    }

    /// Delete the directory. Failures are logged, not returned.
    pub async fn reclaim(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.host_dir).await {
            warn!(
                dir = %self.host_dir.display(),
                error = %e,
                "Failed to reclaim invocation directory"
            );
        }
    }
}
