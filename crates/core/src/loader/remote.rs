use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;

use super::{
    activate_in, commit_load, unload_in, wrong_backend, ContentHandle, ContentLoader,
    LoadOptions, MonotonicProgress, NativeHandle, ProgressSink,
};
use crate::{
    collab::ParentScope,
    key::{Backend, ResolvedSceneKey},
    world::{SceneBlueprint, SceneId, SceneWorld, UnloadOutcome},
    CancellationToken, LoadFailureKind, Result, SceneSwitchError,
};

/// Errors a remote catalog can report while fetching content.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("address is not in the catalog")]
    NotFound,
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("content is corrupt: {0}")]
    Corrupt(String),
    #[error("fetch cancelled")]
    Cancelled,
}

/// On-demand content source addressed by string keys.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Downloads the blueprint behind `address`. Each successful fetch holds
    /// a lease until [`release`](Self::release) is called for it.
    async fn fetch(
        &self,
        address: &str,
        progress: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> std::result::Result<SceneBlueprint, FetchError>;

    fn release(&self, address: &str);
}

#[derive(Debug, Default)]
struct CatalogState {
    entries: HashMap<String, SceneBlueprint>,
    failures: HashMap<String, FetchError>,
    leases: HashMap<String, usize>,
}

/// Remote catalog held in memory with simulated download latency.
#[derive(Debug, Clone)]
pub struct InMemoryRemoteCatalog {
    state: Arc<Mutex<CatalogState>>,
    chunk_latency: Duration,
    chunks: u32,
}

impl InMemoryRemoteCatalog {
    pub fn new(chunk_latency: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CatalogState::default())),
            chunk_latency,
            chunks: 4,
        }
    }

    pub fn insert(&self, address: impl Into<String>, blueprint: SceneBlueprint) -> Result<()> {
        self.lock()?.entries.insert(address.into(), blueprint);
        Ok(())
    }

    /// Makes every future fetch of `address` fail with `error`.
    pub fn fail(&self, address: impl Into<String>, error: FetchError) -> Result<()> {
        self.lock()?.failures.insert(address.into(), error);
        Ok(())
    }

    /// Number of unreleased fetches of `address`.
    pub fn outstanding(&self, address: &str) -> usize {
        self.lock()
            .map(|state| state.leases.get(address).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>> {
        self.state
            .lock()
            .map_err(|_| SceneSwitchError::msg("remote catalog has been poisoned"))
    }
}

#[async_trait]
impl RemoteCatalog for InMemoryRemoteCatalog {
    async fn fetch(
        &self,
        address: &str,
        progress: &dyn ProgressSink,
        token: &CancellationToken,
    ) -> std::result::Result<SceneBlueprint, FetchError> {
        let blueprint = {
            let state = self
                .lock()
                .map_err(|err| FetchError::Unavailable(err.to_string()))?;
            if let Some(error) = state.failures.get(address) {
                return Err(error.clone());
            }
            state.entries.get(address).cloned().ok_or(FetchError::NotFound)?
        };

        for chunk in 1..=self.chunks {
            if token.sleep(self.chunk_latency).await.is_err() {
                return Err(FetchError::Cancelled);
            }
            progress.report(chunk as f32 / self.chunks as f32);
        }

        let mut state = self
            .lock()
            .map_err(|err| FetchError::Unavailable(err.to_string()))?;
        *state.leases.entry(address.to_string()).or_default() += 1;
        Ok(blueprint)
    }

    fn release(&self, address: &str) {
        if let Ok(mut state) = self.lock() {
            if let Some(count) = state.leases.get_mut(address) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.leases.remove(address);
                }
            }
        }
    }
}

/// Loads scenes fetched from a [`RemoteCatalog`].
pub struct RemoteContentLoader {
    world: SceneWorld,
    catalog: Arc<dyn RemoteCatalog>,
    leases: Mutex<HashMap<SceneId, String>>,
}

impl RemoteContentLoader {
    pub fn new(world: SceneWorld, catalog: Arc<dyn RemoteCatalog>) -> Self {
        Self {
            world,
            catalog,
            leases: Mutex::new(HashMap::new()),
        }
    }

    fn lock_leases(&self) -> Result<MutexGuard<'_, HashMap<SceneId, String>>> {
        self.leases
            .lock()
            .map_err(|_| SceneSwitchError::msg("remote lease table has been poisoned"))
    }
}

fn map_fetch_error(key: &ResolvedSceneKey, error: FetchError) -> SceneSwitchError {
    let kind = match error {
        FetchError::Cancelled => return SceneSwitchError::Cancelled,
        FetchError::NotFound => LoadFailureKind::ContentNotFound,
        FetchError::Unavailable(_) => LoadFailureKind::ContentFetchFailed,
        FetchError::Corrupt(_) => LoadFailureKind::LoadFailed,
    };
    SceneSwitchError::load(kind, key.to_string(), error.to_string())
}

#[async_trait]
impl ContentLoader for RemoteContentLoader {
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
        if key.backend() != Backend::Remote {
            return Err(wrong_backend(key, "remote"));
        }
        let address = key
            .remote_id()
            .ok_or_else(|| SceneSwitchError::not_found(key.to_string()))?;
        self.release_stale();

        let monotonic = Mutex::new(MonotonicProgress::new(progress));
        let report = |value: f32| {
            if let Ok(mut monotonic) = monotonic.lock() {
                monotonic.report(value);
            }
        };
        report(0.0);
        // Download accounts for most of the bar; instantiation finishes it.
        let scaled = |value: f32| report(0.9 * value.clamp(0.0, 1.0));
        let blueprint = self
            .catalog
            .fetch(address, &scaled, token)
            .await
            .map_err(|err| map_fetch_error(key, err))?;

        if let Err(err) = token.check() {
            self.catalog.release(address);
            return Err(err);
        }
        let handle = match commit_load(
            &self.world,
            key,
            &blueprint,
            options,
            parent,
            NativeHandle::Remote {
                address: address.to_string(),
            },
        ) {
            Ok(handle) => handle,
            Err(err) => {
                self.catalog.release(address);
                return Err(err);
            }
        };
        self.lock_leases()?
            .insert(handle.scene().id, address.to_string());
        report(1.0);
        tracing::debug!(%key, scene = %handle.scene(), "remote scene loaded");
        Ok(handle)
    }

    async fn activate(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<()> {
        activate_in(&self.world, handle, token).await
    }

    async fn unload(&self, handle: &ContentHandle, token: &CancellationToken) -> Result<UnloadOutcome> {
        let outcome = unload_in(&self.world, handle, token).await?;
        self.release_stale();
        Ok(outcome)
    }

    fn release_stale(&self) {
        let Ok(mut leases) = self.lock_leases() else {
            return;
        };
        let stale: Vec<SceneId> = leases
            .keys()
            .copied()
            .filter(|scene| match self.world.is_loaded(*scene) {
                Ok(loaded) => !loaded,
                Err(err) => {
                    tracing::warn!(%scene, error = %err, "keeping remote lease");
                    false
                }
            })
            .collect();
        for scene in stale {
            if let Some(address) = leases.remove(&scene) {
                self.catalog.release(&address);
                tracing::debug!(%scene, %address, "released remote lease");
            }
        }
    }
}

impl std::fmt::Debug for RemoteContentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContentLoader")
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loader::NoProgress,
        world::{ObjectBlueprint, ScenePhase},
    };

    fn setup() -> (RemoteContentLoader, InMemoryRemoteCatalog) {
        let world = SceneWorld::new();
        world
            .instantiate(&SceneBlueprint::new("MainMenu"), ScenePhase::Integrated, None)
            .unwrap();
        let catalog = InMemoryRemoteCatalog::new(Duration::from_millis(1));
        catalog
            .insert(
                "levels/2",
                SceneBlueprint::new("Level2").with_object(ObjectBlueprint::new("Boss")),
            )
            .unwrap();
        let loader = RemoteContentLoader::new(world, Arc::new(catalog.clone()));
        (loader, catalog)
    }

    fn additive() -> LoadOptions {
        LoadOptions {
            additive: true,
            activate_on_load: true,
        }
    }

    async fn load(loader: &RemoteContentLoader, address: &str) -> Result<ContentHandle> {
        loader
            .load(
                &ResolvedSceneKey::remote(address),
                additive(),
                &NoProgress,
                &ParentScope::default(),
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn fetches_and_instantiates() {
        let (loader, catalog) = setup();
        let handle = load(&loader, "levels/2").await.unwrap();

        assert_eq!(handle.scene().name, "Level2");
        assert_eq!(
            handle.native(),
            &NativeHandle::Remote {
                address: "levels/2".to_string()
            }
        );
        assert!(loader.world().find_object("Boss").unwrap().is_some());
        assert_eq!(catalog.outstanding("levels/2"), 1);
    }

    #[tokio::test]
    async fn unloading_releases_the_lease() {
        let (loader, catalog) = setup();
        let handle = load(&loader, "levels/2").await.unwrap();

        loader.unload(&handle, &CancellationToken::new()).await.unwrap();
        assert_eq!(catalog.outstanding("levels/2"), 0);
    }

    #[tokio::test]
    async fn bulk_unload_releases_leases_too() {
        let (loader, catalog) = setup();
        let handle = load(&loader, "levels/2").await.unwrap();

        let report = loader
            .unload_scenes(&[handle.scene().clone()], None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.unloaded.len(), 1);
        assert_eq!(catalog.outstanding("levels/2"), 0);
    }

    #[tokio::test]
    async fn maps_catalog_failures_to_load_kinds() {
        let (loader, catalog) = setup();
        catalog
            .insert("levels/3", SceneBlueprint::new("Level3"))
            .unwrap();
        catalog
            .fail("levels/3", FetchError::Unavailable("503".to_string()))
            .unwrap();

        let fetch = load(&loader, "levels/3").await.unwrap_err();
        assert_eq!(fetch.load_kind(), Some(LoadFailureKind::ContentFetchFailed));

        let missing = load(&loader, "levels/9").await.unwrap_err();
        assert_eq!(missing.load_kind(), Some(LoadFailureKind::ContentNotFound));

        catalog
            .fail("levels/2", FetchError::Corrupt("bad header".to_string()))
            .unwrap();
        let corrupt = load(&loader, "levels/2").await.unwrap_err();
        assert_eq!(corrupt.load_kind(), Some(LoadFailureKind::LoadFailed));
    }

    /// Catalog whose progress goes backwards halfway through.
    struct JitteryCatalog;

    #[async_trait]
    impl RemoteCatalog for JitteryCatalog {
        async fn fetch(
            &self,
            _address: &str,
            progress: &dyn ProgressSink,
            _token: &CancellationToken,
        ) -> std::result::Result<SceneBlueprint, FetchError> {
            progress.report(0.5);
            progress.report(0.3);
            progress.report(0.8);
            Ok(SceneBlueprint::new("Jittery"))
        }

        fn release(&self, _address: &str) {}
    }

    #[tokio::test]
    async fn progress_never_goes_backwards() {
        let loader = RemoteContentLoader::new(SceneWorld::new(), Arc::new(JitteryCatalog));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |value: f32| seen.lock().unwrap().push(value)
        };

        loader
            .load(
                &ResolvedSceneKey::remote("levels/j"),
                additive(),
                &sink,
                &ParentScope::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&1.0));
    }

    #[tokio::test]
    async fn poisoned_world_keeps_leases() {
        let (loader, catalog) = setup();
        load(&loader, "levels/2").await.unwrap();

        loader.world().poison();
        loader.release_stale();

        assert_eq!(catalog.outstanding("levels/2"), 1);
    }

    #[tokio::test]
    async fn cancellation_is_not_wrapped() {
        let (loader, catalog) = setup();
        let token = CancellationToken::new();
        token.cancel();

        let err = loader
            .load(
                &ResolvedSceneKey::remote("levels/2"),
                additive(),
                &NoProgress,
                &ParentScope::default(),
                &token,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(catalog.outstanding("levels/2"), 0);
    }
}
