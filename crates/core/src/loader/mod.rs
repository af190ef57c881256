//! Content loader family.
//!
//! Two backends load scenes into the shared [`SceneWorld`]: the native build
//! list ([`NativeContentLoader`]) and an on-demand remote catalog
//! ([`RemoteContentLoader`]). [`DispatchingLoader`] routes each key to the
//! backend it names.

mod dispatch;
mod native;
mod remote;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

pub use dispatch::DispatchingLoader;
pub use native::NativeContentLoader;
pub use remote::{FetchError, InMemoryRemoteCatalog, RemoteCatalog, RemoteContentLoader};

use crate::{
    collab::ParentScope,
    key::ResolvedSceneKey,
    world::{SceneBlueprint, ScenePhase, SceneRef, SceneWorld, UnloadOutcome},
    CancellationToken, LoadFailureKind, Result, SceneSwitchError,
};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Backend-specific part of a [`ContentHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeHandle {
    Native { build_name: String },
    Remote { address: String },
}

/// Handle to one loaded content unit.
///
/// Created by a load, consumed by activation and unload. It stops being
/// valid as soon as the scene leaves the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHandle {
    id: u64,
    scene: SceneRef,
    native: NativeHandle,
    replaces_others: bool,
}

impl ContentHandle {
    pub(crate) fn new(scene: SceneRef, native: NativeHandle, replaces_others: bool) -> Self {
        Self {
            id: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            scene,
            native,
            replaces_others,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scene(&self) -> &SceneRef {
        &self.scene
    }

    pub fn native(&self) -> &NativeHandle {
        &self.native
    }

    /// Whether activating this content unloads every non-retained scene.
    pub fn replaces_others(&self) -> bool {
        self.replaces_others
    }

    pub fn is_valid(&self, world: &SceneWorld) -> Result<bool> {
        world.is_loaded(self.scene.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep the scenes that are already loaded.
    pub additive: bool,
    /// Integrate the scene as soon as it is loaded.
    pub activate_on_load: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            additive: false,
            activate_on_load: true,
        }
    }
}

/// Receives load progress in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: f32);
}

impl<F> ProgressSink for F
where
    F: Fn(f32) + Send + Sync,
{
    fn report(&self, progress: f32) {
        self(progress)
    }
}

/// Progress sink that discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: f32) {}
}

/// Clamps reports into `[0, 1]` and drops anything that would move backwards.
pub(crate) struct MonotonicProgress<'a> {
    sink: &'a dyn ProgressSink,
    last: f32,
}

impl<'a> MonotonicProgress<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink, last: -1.0 }
    }

    pub(crate) fn report(&mut self, progress: f32) {
        let value = progress.clamp(0.0, 1.0);
        if value > self.last {
            self.last = value;
            self.sink.report(value);
        }
    }
}

/// What a bulk unload did with each requested scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnloadReport {
    pub unloaded: Vec<SceneRef>,
    /// Left loaded because it was the last regular scene in the world.
    pub kept_last: Vec<SceneRef>,
    /// Skipped because it is the quarantine scene or was already gone.
    pub skipped: Vec<SceneRef>,
}

#[async_trait]
pub trait ContentLoader: Send + Sync {
    fn world(&self) -> &SceneWorld;

    /// Loads the scene `key` names, reporting monotonic progress.
    ///
    /// With `activate_on_load` unset the scene is staged and needs
    /// [`activate`](Self::activate) before it can become active.
    async fn load(
        &self,
        key: &ResolvedSceneKey,
        options: LoadOptions,
        progress: &dyn ProgressSink,
        parent: &ParentScope,
        token: &CancellationToken,
    ) -> Result<ContentHandle>;

    /// Integrates staged content.
    async fn activate(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<()>;

    /// Unloads the content behind `handle`. Invalid handles are a no-op.
    async fn unload(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<UnloadOutcome>;

    /// Drops backend bookkeeping for scenes that are no longer loaded.
    fn release_stale(&self) {}

    /// Unloads every scene in `scenes`, skipping the quarantine scene and
    /// never unloading the last regular scene.
    async fn unload_scenes(
        &self,
        scenes: &[SceneRef],
        quarantine: Option<&str>,
        token: &CancellationToken,
    ) -> Result<UnloadReport> {
        let report = bulk_unload(self.world(), scenes, quarantine, token).await?;
        self.release_stale();
        Ok(report)
    }
}

pub(crate) async fn bulk_unload(
    world: &SceneWorld,
    scenes: &[SceneRef],
    quarantine: Option<&str>,
    token: &CancellationToken,
) -> Result<UnloadReport> {
    let mut report = UnloadReport::default();
    for scene in scenes {
        token.check()?;
        if quarantine.is_some_and(|name| name == scene.name) {
            report.skipped.push(scene.clone());
            continue;
        }
        match world.unload_scene(scene.id)? {
            UnloadOutcome::Unloaded => report.unloaded.push(scene.clone()),
            UnloadOutcome::NotLoaded => report.skipped.push(scene.clone()),
            UnloadOutcome::KeptLastScene => {
                tracing::debug!(scene = %scene, "kept last loaded scene");
                report.kept_last.push(scene.clone())
            }
        }
        tokio::task::yield_now().await;
    }
    Ok(report)
}

/// Instantiates `blueprint` and wraps the result in a handle.
pub(crate) fn commit_load(
    world: &SceneWorld,
    key: &ResolvedSceneKey,
    blueprint: &SceneBlueprint,
    options: LoadOptions,
    parent: &ParentScope,
    native: NativeHandle,
) -> Result<ContentHandle> {
    let phase = if options.activate_on_load {
        ScenePhase::Integrated
    } else {
        ScenePhase::Staged
    };
    let scene = world
        .instantiate(blueprint, phase, Some(&parent.name))
        .map_err(|err| load_failed(key, err))?;

    let replaces_others = !options.additive;
    if replaces_others && options.activate_on_load {
        let replaced = world.replace_with(scene.id).map_err(|err| load_failed(key, err))?;
        tracing::debug!(scene = %scene, replaced = replaced.len(), "non-additive load replaced scenes");
    }

    Ok(ContentHandle::new(scene, native, replaces_others))
}

/// Shared activation path for every backend.
pub(crate) async fn activate_in(
    world: &SceneWorld,
    handle: &ContentHandle,
    token: &CancellationToken,
) -> Result<()> {
    token.check()?;
    if !handle.is_valid(world)? {
        return Err(SceneSwitchError::InvalidHandle(handle.id()));
    }
    world.integrate(handle.scene().id)?;
    if handle.replaces_others() {
        world.replace_with(handle.scene().id)?;
    }
    tokio::task::yield_now().await;
    Ok(())
}

pub(crate) async fn unload_in(
    world: &SceneWorld,
    handle: &ContentHandle,
    token: &CancellationToken,
) -> Result<UnloadOutcome> {
    token.check()?;
    let outcome = world.unload_scene(handle.scene().id)?;
    tokio::task::yield_now().await;
    Ok(outcome)
}

fn load_failed(key: &ResolvedSceneKey, err: SceneSwitchError) -> SceneSwitchError {
    match err {
        SceneSwitchError::Cancelled | SceneSwitchError::Load { .. } => err,
        other => SceneSwitchError::load(LoadFailureKind::LoadFailed, key.to_string(), other.to_string()),
    }
}

pub(crate) fn wrong_backend(key: &ResolvedSceneKey, loader: &str) -> SceneSwitchError {
    SceneSwitchError::load(
        LoadFailureKind::LoadFailed,
        key.to_string(),
        format!("key was routed to the {loader} loader"),
    )
}
