//! Runtime image building.
//!
//! [`ImageBuilder`] ensures the shared image of each runtime exists, building
//! it from `Dockerfile.<runtime>` the first time it is requested.
//!
//! # Single flight
//!
//! Each runtime has one build slot guarded by an async mutex. A caller that
//! arrives while a build is in flight waits on the mutex and then observes
//! the result of that build instead of starting another one:
//!
//! - if it succeeded, the tag is marked built and returned;
//! - if it failed, every caller that was waiting on it gets the same
//!   `BuildFailed` error. Callers arriving afterwards retry the build.
//!
//! Builds of different runtimes proceed in parallel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use faas_runner_common::{BuilderConfig, ImageTag, RunnerError, Runtime};

use crate::backend::{BuildRequest, ContainerBackend};

#[derive(Default)]
struct BuildSlot {
    /// Completed build attempts. Read before locking to detect that a build
    /// finished while the caller was waiting.
    attempts: AtomicU64,
    /// Mirrors `SlotState::built` for lock-free readers.
    built: AtomicBool,
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    built: bool,
    last_error: Option<String>,
}

impl BuildSlot {
    fn set_built(&self, state: &mut SlotState, built: bool) {
        state.built = built;
        self.built.store(built, Ordering::Release);
    }
}

/// Builds and tracks runtime images.
pub struct ImageBuilder {
    backend: Arc<dyn ContainerBackend>,
    config: BuilderConfig,
    slots: DashMap<Runtime, Arc<BuildSlot>>,
}

impl ImageBuilder {
    pub fn new(backend: Arc<dyn ContainerBackend>, config: BuilderConfig) -> Self {
        Self {
            backend,
            config,
            slots: DashMap::new(),
        }
    }

    /// Ensure the image for `runtime` exists and return its tag.
    ///
    /// Once built, a tag is reused until [`ImageBuilder::invalidate`] is
    /// called.
    #[instrument(skip(self), fields(runtime = %runtime))]
    pub async fn ensure_image(&self, runtime: Runtime) -> Result<ImageTag, RunnerError> {
        let tag = runtime.image_tag();
        // Clone the slot out so no map guard is held across an await.
        let slot = self.slots.entry(runtime).or_default().clone();

        let observed = slot.attempts.load(Ordering::Acquire);
        let mut state = slot.state.lock().await;

        if state.built {
            return Ok(tag);
        }
        if slot.attempts.load(Ordering::Acquire) != observed {
            if let Some(stderr) = &state.last_error {
                return Err(RunnerError::build_failed(tag.as_str(), stderr.clone()));
            }
        }

        let request = BuildRequest {
            dockerfile: self.config.dockerfile_path(runtime),
            tag: tag.clone(),
            context_dir: self.config.context_dir.clone(),
        };

        info!(
            image_tag = %tag,
            dockerfile = %request.dockerfile.display(),
            "Building runtime image"
        );
        let start = Instant::now();
        let result = self.backend.build_image(&request).await;
        slot.attempts.fetch_add(1, Ordering::Release);

        match result {
            Ok(()) => {
                info!(
                    image_tag = %tag,
                    duration_ms = start.elapsed().as_millis(),
                    "Runtime image ready"
                );
                slot.set_built(&mut state, true);
                state.last_error = None;
                Ok(tag)
            }
            Err(e) => {
                let stderr = e.detail();
                error!(image_tag = %tag, error = %stderr, "Runtime image build failed");
                state.last_error = Some(stderr.clone());
                Err(RunnerError::build_failed(tag.as_str(), stderr))
            }
        }
    }

    /// Forget that the image of `runtime` was built; the next
    /// [`ImageBuilder::ensure_image`] rebuilds it.
    pub async fn invalidate(&self, runtime: Runtime) {
        let slot = self.slots.get(&runtime).map(|s| s.clone());
        if let Some(slot) = slot {
            let mut state = slot.state.lock().await;
            slot.set_built(&mut state, false);
            state.last_error = None;
            info!(runtime = %runtime, "Runtime image invalidated");
        }
    }

    /// Whether the image of `runtime` is known to be built. Never waits on
    /// an in-flight build.
    pub fn is_built(&self, runtime: Runtime) -> bool {
        self.slots
            .get(&runtime)
            .is_some_and(|slot| slot.built.load(Ordering::Acquire))
    }
}

impl std::fmt::Debug for ImageBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuilder")
            .field("docker_dir", &self.config.docker_dir)
            .field("runtimes_tracked", &self.slots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::FakeBackend;

    fn builder(backend: &Arc<FakeBackend>) -> ImageBuilder {
        ImageBuilder::new(backend.clone(), BuilderConfig::default())
    }

    #[tokio::test]
    async fn test_build_once_then_reuse() {
        let backend = Arc::new(FakeBackend::new());
        let images = builder(&backend);

        let tag = images.ensure_image(Runtime::Python).await.unwrap();
        assert_eq!(tag.as_str(), "func-python-image");
        images.ensure_image(Runtime::Python).await.unwrap();

        assert_eq!(backend.build_count("func-python-image"), 1);
        assert!(images.is_built(Runtime::Python));
        assert!(!images.is_built(Runtime::Node));
    }

    #[tokio::test]
    async fn test_concurrent_callers_join_one_build() {
        let backend = Arc::new(FakeBackend::new().with_build_delay(Duration::from_millis(50)));
        let images = builder(&backend);

        let (a, b, c) = tokio::join!(
            images.ensure_image(Runtime::Node),
            images.ensure_image(Runtime::Node),
            images.ensure_image(Runtime::Node),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(backend.build_count("func-node-image"), 1);
    }

    #[tokio::test]
    async fn test_waiters_share_a_failed_build() {
        let backend = Arc::new(
            FakeBackend::new()
                .with_build_delay(Duration::from_millis(50))
                .with_failing_builds("COPY failed"),
        );
        let images = builder(&backend);

        let (a, b) = tokio::join!(
            images.ensure_image(Runtime::Python),
            images.ensure_image(Runtime::Python),
        );

        assert!(matches!(a, Err(RunnerError::BuildFailed { .. })));
        assert!(matches!(b, Err(RunnerError::BuildFailed { ref stderr, .. }) if stderr.contains("COPY failed")));
        assert_eq!(backend.build_count("func-python-image"), 1);
        assert!(!images.is_built(Runtime::Python));
    }

    #[tokio::test]
    async fn test_failed_build_is_retried_later() {
        let backend = Arc::new(FakeBackend::new().with_failing_builds("network down"));
        let images = builder(&backend);

        tokio_test::assert_err!(images.ensure_image(Runtime::Python).await);

        backend.set_builds_failing(None);
        tokio_test::assert_ok!(images.ensure_image(Runtime::Python).await);
        assert_eq!(backend.build_count("func-python-image"), 2);
    }

    #[tokio::test]
    async fn test_is_built_while_slot_is_locked() {
        let backend = Arc::new(FakeBackend::new());
        let images = builder(&backend);
        images.ensure_image(Runtime::Python).await.unwrap();

        let slot = images.slots.get(&Runtime::Python).map(|s| s.clone()).unwrap();
        let _held = slot.state.lock().await;
        assert!(images.is_built(Runtime::Python));
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let backend = Arc::new(FakeBackend::new());
        let images = builder(&backend);

        images.ensure_image(Runtime::Node).await.unwrap();
        images.invalidate(Runtime::Node).await;
        assert!(!images.is_built(Runtime::Node));

        images.ensure_image(Runtime::Node).await.unwrap();
        assert_eq!(backend.build_count("func-node-image"), 2);
    }
}
