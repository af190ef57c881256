use std::time::Duration;

use async_trait::async_trait;

use super::{
    activate_in, commit_load, unload_in, wrong_backend, ContentHandle, ContentLoader,
    LoadOptions, MonotonicProgress, NativeHandle, ProgressSink,
};
use crate::{
    collab::ParentScope,
    key::{Backend, ResolvedSceneKey},
    world::{SceneWorld, UnloadOutcome},
    CancellationToken, Result, SceneSwitchError,
};

/// Loads scenes from the world's native build catalog.
#[derive(Debug, Clone)]
pub struct NativeContentLoader {
    world: SceneWorld,
    tick: Duration,
}

impl NativeContentLoader {
    /// `tick` is the delay between progress polls while a scene streams in.
    pub fn new(world: SceneWorld, tick: Duration) -> Self {
        Self { world, tick }
    }
}

#[async_trait]
impl ContentLoader for NativeContentLoader {
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
        if key.backend() != Backend::Native {
            return Err(wrong_backend(key, "native"));
        }
        let build_name = key
            .native_id()
            .ok_or_else(|| SceneSwitchError::not_found(key.to_string()))?;
        let blueprint = self
            .world
            .blueprint(build_name)?
            .ok_or_else(|| SceneSwitchError::not_found(key.to_string()))?;

        let mut progress = MonotonicProgress::new(progress);
        progress.report(0.0);
        let steps = blueprint.load_steps.max(1);
        // Streaming tops out just below 1.0; the final report happens once the
        // scene is committed to the world.
        for step in 1..=steps {
            token.sleep(self.tick).await?;
            progress.report(0.9 * step as f32 / steps as f32);
        }
        token.check()?;

        let handle = commit_load(
            &self.world,
            key,
            &blueprint,
            options,
            parent,
            NativeHandle::Native {
                build_name: build_name.to_string(),
            },
        )?;
        progress.report(1.0);
        tracing::debug!(%key, scene = %handle.scene(), "native scene loaded");
        Ok(handle)
    }

    async fn activate(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<()> {
        activate_in(&self.world, handle, token).await
    }

    async fn unload(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<UnloadOutcome> {
        unload_in(&self.world, handle, token).await
    }
}
