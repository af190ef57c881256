//! Shared demo world for unit and scenario tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    collab::{CountingInputBlocker, Fader, TransitionEvents, TransitionStatus},
    config::{AppConfig, SceneEntry},
    context::{TransitionContext, TransitionServices},
    key::{Backend, ResolvedSceneKey, SceneKeyResolver},
    loader::{DispatchingLoader, InMemoryRemoteCatalog, NativeContentLoader, RemoteContentLoader},
    runner::{TransitionRequest, TransitionRunner},
    world::{ObjectBlueprint, SceneBlueprint, ScenePhase, SceneWorld, Transform},
    CancellationToken, Result,
};

/// Fader that records calls and sleeps through the requested duration.
#[derive(Debug, Default)]
pub(crate) struct RecordingFader {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingFader {
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fader for RecordingFader {
    async fn fade_in(&self, duration: Duration, token: &CancellationToken) -> Result<()> {
        self.calls.lock().unwrap().push("fade-in");
        token.sleep(duration).await
    }

    async fn fade_out(&self, duration: Duration, token: &CancellationToken) -> Result<()> {
        self.calls.lock().unwrap().push("fade-out");
        token.sleep(duration).await
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingEvents {
    seen: Mutex<Vec<TransitionStatus>>,
}

impl RecordingEvents {
    pub(crate) fn seen(&self) -> Vec<TransitionStatus> {
        self.seen.lock().unwrap().clone()
    }
}

impl TransitionEvents for RecordingEvents {
    fn emit(&self, status: TransitionStatus) {
        self.seen.lock().unwrap().push(status);
    }
}

/// World with `MainMenu` loaded and active, `Level2` and `Loading` in the
/// native build list, and `Level3` served remotely from `levels/3`.
pub(crate) struct Fixture {
    pub world: SceneWorld,
    pub catalog: Arc<InMemoryRemoteCatalog>,
    pub fader: Arc<RecordingFader>,
    pub input: Arc<CountingInputBlocker>,
    pub events: Arc<RecordingEvents>,
    pub services: Arc<TransitionServices>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_config(Self::config())
    }

    pub(crate) fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.transition.fade_out_ms = 2;
        config.transition.fade_in_ms = 2;
        config.transition.progress_tick_ms = 1;
        config.scenes.push(SceneEntry {
            name: "Level3".to_string(),
            backend: Backend::Remote,
            native_id: None,
            remote_address: Some("levels/3".to_string()),
        });
        config
    }

    pub(crate) fn with_config(config: AppConfig) -> Self {
        let world = SceneWorld::new();
        let menu = SceneBlueprint::new("MainMenu")
            .with_object(ObjectBlueprint::new("Camera"))
            .with_object(ObjectBlueprint::new("Menu").with_child(ObjectBlueprint::new("PlayButton")));
        let level = SceneBlueprint::new("Level2")
            .with_object(ObjectBlueprint::new("Terrain"))
            .with_object(
                ObjectBlueprint::new("Player").with_transform(Transform::at([0.0, 1.0, 0.0])),
            );
        world.register_blueprint(menu.clone()).unwrap();
        world.register_blueprint(level).unwrap();
        world
            .register_blueprint(SceneBlueprint::new("Loading").with_load_steps(1))
            .unwrap();
        world.instantiate(&menu, ScenePhase::Integrated, None).unwrap();

        let catalog = Arc::new(InMemoryRemoteCatalog::new(Duration::from_millis(1)));
        catalog
            .insert(
                "levels/3",
                SceneBlueprint::new("Level3").with_object(ObjectBlueprint::new("Boss")),
            )
            .unwrap();

        let native = Arc::new(NativeContentLoader::new(
            world.clone(),
            config.transition.progress_tick(),
        ));
        let remote = Arc::new(RemoteContentLoader::new(world.clone(), catalog.clone()));
        let loader = Arc::new(DispatchingLoader::new(world.clone(), native, remote));

        let fader = Arc::new(RecordingFader::default());
        let input = Arc::new(CountingInputBlocker::new());
        let services = Arc::new(TransitionServices {
            world: world.clone(),
            loader,
            resolver: SceneKeyResolver::new(world.clone(), &config.scenes),
            fader: Some(fader.clone()),
            input: Some(input.clone()),
            config,
        });

        Self {
            world,
            catalog,
            fader,
            input,
            events: Arc::new(RecordingEvents::default()),
            services,
        }
    }

    pub(crate) fn context(&self, request: TransitionRequest) -> TransitionContext {
        let key = self
            .services
            .resolver
            .resolve(&request.destination)
            .unwrap();
        self.context_for_key(request, key)
    }

    pub(crate) fn context_for_key(
        &self,
        request: TransitionRequest,
        key: ResolvedSceneKey,
    ) -> TransitionContext {
        TransitionContext::new(request, key, self.services.clone()).unwrap()
    }

    pub(crate) fn runner(&self) -> TransitionRunner {
        TransitionRunner::with_shared(self.services.clone())
    }

    pub(crate) fn scene_names(&self) -> Vec<String> {
        self.world
            .loaded_scenes()
            .unwrap()
            .into_iter()
            .map(|scene| scene.name)
            .collect()
    }
}
