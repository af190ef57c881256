use std::sync::Arc;

use async_trait::async_trait;

use super::{ContentHandle, ContentLoader, LoadOptions, NativeHandle, ProgressSink};
use crate::{
    collab::ParentScope,
    key::{Backend, ResolvedSceneKey},
    world::{SceneWorld, UnloadOutcome},
    CancellationToken, Result,
};

/// Routes each key or handle to the backend that owns it.
pub struct DispatchingLoader {
    world: SceneWorld,
    native: Arc<dyn ContentLoader>,
    remote: Arc<dyn ContentLoader>,
}

impl DispatchingLoader {
    pub fn new(
        world: SceneWorld,
        native: Arc<dyn ContentLoader>,
        remote: Arc<dyn ContentLoader>,
    ) -> Self {
        Self {
            world,
            native,
            remote,
        }
    }

    fn for_backend(&self, backend: Backend) -> &dyn ContentLoader {
        match backend {
            Backend::Native => self.native.as_ref(),
            Backend::Remote => self.remote.as_ref(),
        }
    }

    fn for_handle(&self, handle: &ContentHandle) -> &dyn ContentLoader {
        match handle.native() {
            NativeHandle::Native { .. } => self.native.as_ref(),
            NativeHandle::Remote { .. } => self.remote.as_ref(),
        }
    }
}

#[async_trait]
impl ContentLoader for DispatchingLoader {
    fn world(&self) -> &SceneWorld {
        &self.world
    }

    async fn load(
        &self,
        key: &ResolvedSceneKey,
        options: LoadOptions,
        progress: &dyn ProgressSink,
        parent: &ParentScope,
        token: &CancellationToken,
    ) -> Result<ContentHandle> {
        tracing::debug!(%key, backend = ?key.backend(), "dispatching load");
        self.for_backend(key.backend())
            .load(key, options, progress, parent, token)
            .await
    }

    async fn activate(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<()> {
        self.for_handle(handle).activate(handle, token).await
    }

    async fn unload(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<UnloadOutcome> {
        self.for_handle(handle).unload(handle, token).await
    }

    fn release_stale(&self) {
        self.native.release_stale();
        self.remote.release_stale();
    }
}

impl std::fmt::Debug for DispatchingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchingLoader")
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}
