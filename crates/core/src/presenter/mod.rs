//! Loading indicator strategies.
//!
//! A run uses exactly one strategy, picked by [`PresenterFactory`] the first
//! time the context needs it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{IndicatorStrategy, LoadingConfig},
    context::{IndicatorHandle, TransitionContext},
    key::{ResolvedSceneKey, SceneKeyResolver, SceneReference},
    loader::{LoadOptions, NoProgress},
    world::UnloadOutcome,
    CancellationToken, Result,
};

/// How a hide request ended. Teardown problems are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HideOutcome {
    NotShown,
    Hidden,
    TeardownFailed(String),
}

#[async_trait]
pub trait LoadingPresenter: Send + Sync {
    fn strategy(&self) -> IndicatorStrategy;

    /// Shows the indicator. Does nothing if the plan already holds one.
    async fn show(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()>;

    /// Tears the indicator down and clears it from the plan.
    async fn hide(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> HideOutcome;
}

/// Persistent overlay object that lives outside every scene.
#[derive(Debug, Clone)]
pub struct OverlayPresenter {
    name: String,
}

impl OverlayPresenter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LoadingPresenter for OverlayPresenter {
    fn strategy(&self) -> IndicatorStrategy {
        IndicatorStrategy::Overlay
    }

    async fn show(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        if ctx.plan().indicator_loaded() {
            return Ok(());
        }
        token.check()?;
        let overlay = ctx.world().spawn_persistent(&self.name)?;
        ctx.plan_mut().record_indicator(IndicatorHandle::Overlay(overlay));
        tracing::debug!(%overlay, "loading overlay shown");
        Ok(())
    }

    async fn hide(&self, ctx: &mut TransitionContext, _token: &CancellationToken) -> HideOutcome {
        match ctx.plan_mut().take_indicator() {
            None => HideOutcome::NotShown,
            Some(IndicatorHandle::Overlay(overlay)) => match ctx.world().destroy(overlay) {
                Ok(_) => HideOutcome::Hidden,
                Err(err) => {
                    tracing::warn!(%overlay, error = %err, "failed to destroy loading overlay");
                    HideOutcome::TeardownFailed(err.to_string())
                }
            },
            Some(IndicatorHandle::Scene(handle)) => {
                // Strategies never mix within one run.
                tracing::warn!(scene = %handle.scene(), "overlay presenter asked to hide a scene indicator");
                HideOutcome::TeardownFailed("indicator was not created by this presenter".to_string())
            }
        }
    }
}

/// Dedicated indicator scene loaded additively next to the content.
#[derive(Debug, Clone)]
pub struct ScenePresenter {
    key: ResolvedSceneKey,
}

impl ScenePresenter {
    pub fn new(key: ResolvedSceneKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &ResolvedSceneKey {
        &self.key
    }
}

#[async_trait]
impl LoadingPresenter for ScenePresenter {
    fn strategy(&self) -> IndicatorStrategy {
        IndicatorStrategy::Scene
    }

    async fn show(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        if ctx.plan().indicator_loaded() {
            return Ok(());
        }
        let options = LoadOptions {
            additive: true,
            activate_on_load: true,
        };
        let parent = ctx.request().parent.clone();
        let handle = ctx
            .loader()
            .load(&self.key, options, &NoProgress, &parent, token)
            .await?;
        // The indicator must survive non-additive loads of the destination.
        ctx.world().set_retained(handle.scene().id, true)?;
        tracing::debug!(scene = %handle.scene(), "loading scene shown");
        ctx.plan_mut().record_indicator(IndicatorHandle::Scene(handle));
        Ok(())
    }

    async fn hide(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> HideOutcome {
        let handle = match ctx.plan_mut().take_indicator() {
            None => return HideOutcome::NotShown,
            Some(IndicatorHandle::Scene(handle)) => handle,
            Some(IndicatorHandle::Overlay(overlay)) => {
                tracing::warn!(%overlay, "scene presenter asked to hide an overlay indicator");
                return HideOutcome::TeardownFailed(
                    "indicator was not created by this presenter".to_string(),
                );
            }
        };
        match ctx.loader().unload(&handle, token).await {
            Ok(UnloadOutcome::KeptLastScene) => {
                tracing::warn!(scene = %handle.scene(), "loading scene is the last scene and stays loaded");
                HideOutcome::TeardownFailed("loading scene is the last loaded scene".to_string())
            }
            Ok(_) => HideOutcome::Hidden,
            Err(err) => {
                tracing::warn!(scene = %handle.scene(), error = %err, "failed to unload loading scene");
                HideOutcome::TeardownFailed(err.to_string())
            }
        }
    }
}

/// Result of [`PresenterFactory::select`].
pub struct PresenterSelection {
    pub presenter: Arc<dyn LoadingPresenter>,
    /// Resolved indicator scene when the scene strategy was chosen.
    pub indicator_key: Option<ResolvedSceneKey>,
}

/// Chooses a presenter from configuration, optionally overridden per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenterFactory;

impl PresenterFactory {
    pub fn select(
        config: &LoadingConfig,
        requested: Option<IndicatorStrategy>,
        resolver: &SceneKeyResolver,
    ) -> Result<PresenterSelection> {
        match requested.unwrap_or(config.strategy) {
            IndicatorStrategy::Overlay => Ok(PresenterSelection {
                presenter: Arc::new(OverlayPresenter::new(config.overlay_name.clone())),
                indicator_key: None,
            }),
            IndicatorStrategy::Scene => {
                let key = resolver.resolve(&SceneReference::named(config.indicator_scene.clone()))?;
                Ok(PresenterSelection {
                    presenter: Arc::new(ScenePresenter::new(key.clone())),
                    indicator_key: Some(key),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_support::Fixture, world::SceneBlueprint, TransitionRequest};

    #[tokio::test]
    async fn overlay_show_and_hide_are_idempotent() {
        let fixture = Fixture::new();
        let mut ctx = fixture.context(TransitionRequest::to("Level2"));
        let presenter = OverlayPresenter::new("Overlay");
        let token = CancellationToken::new();

        presenter.show(&mut ctx, &token).await.unwrap();
        let first = ctx.plan().indicator().cloned();
        presenter.show(&mut ctx, &token).await.unwrap();
        assert_eq!(ctx.plan().indicator().cloned(), first);
        assert!(fixture.world.find_object("Overlay").unwrap().is_some());

        assert_eq!(presenter.hide(&mut ctx, &token).await, HideOutcome::Hidden);
        assert_eq!(presenter.hide(&mut ctx, &token).await, HideOutcome::NotShown);
        assert!(fixture.world.find_object("Overlay").unwrap().is_none());
    }

    #[tokio::test]
    async fn scene_presenter_loads_a_retained_scene_once() {
        let fixture = Fixture::new();
        let mut ctx = fixture.context(TransitionRequest::to("Level2"));
        let presenter = ScenePresenter::new(ResolvedSceneKey::native("Loading"));
        let token = CancellationToken::new();
        let before = fixture.world.loaded_count().unwrap();

        presenter.show(&mut ctx, &token).await.unwrap();
        presenter.show(&mut ctx, &token).await.unwrap();
        assert_eq!(fixture.world.loaded_count().unwrap(), before + 1);
        let loading = fixture.world.find_scene("Loading").unwrap().unwrap();
        assert!(fixture.world.is_retained(loading.id).unwrap());

        assert_eq!(presenter.hide(&mut ctx, &token).await, HideOutcome::Hidden);
        assert_eq!(presenter.hide(&mut ctx, &token).await, HideOutcome::NotShown);
        assert_eq!(fixture.world.loaded_count().unwrap(), before);
    }

    #[tokio::test]
    async fn indicator_scene_goes_even_when_one_content_scene_is_left() {
        let fixture = Fixture::new();
        let mut ctx = fixture.context(TransitionRequest::to("Level2"));
        let presenter = ScenePresenter::new(ResolvedSceneKey::native("Loading"));
        let token = CancellationToken::new();
        presenter.show(&mut ctx, &token).await.unwrap();

        assert_eq!(presenter.hide(&mut ctx, &token).await, HideOutcome::Hidden);
        assert_eq!(fixture.scene_names(), vec!["MainMenu".to_string()]);
    }

    #[tokio::test]
    async fn hide_swallows_teardown_failures() {
        let fixture = Fixture::new();
        let mut ctx = fixture.context(TransitionRequest::to("Level2"));
        let presenter = ScenePresenter::new(ResolvedSceneKey::native("Loading"));
        let token = CancellationToken::new();
        presenter.show(&mut ctx, &token).await.unwrap();

        // Leave the indicator as the only scene so the world refuses to drop it.
        let loading = fixture.world.find_scene("Loading").unwrap().unwrap();
        for scene in fixture.world.loaded_scenes().unwrap() {
            if scene.id != loading.id {
                fixture.world.set_retained(scene.id, true).unwrap();
                fixture.world.unload_scene(scene.id).unwrap();
            }
        }
        assert_eq!(fixture.world.loaded_count().unwrap(), 1);

        let outcome = presenter.hide(&mut ctx, &token).await;
        assert!(matches!(outcome, HideOutcome::TeardownFailed(_)));
        assert!(!ctx.plan().indicator_loaded());
    }

    #[test]
    fn factory_honours_config_and_override() {
        let fixture = Fixture::new();
        fixture
            .world
            .register_blueprint(SceneBlueprint::new("Spinner"))
            .unwrap();
        let resolver = SceneKeyResolver::new(fixture.world.clone(), &[]);
        let config = LoadingConfig {
            strategy: IndicatorStrategy::Scene,
            indicator_scene: "Spinner".to_string(),
            overlay_name: "Overlay".to_string(),
        };

        let chosen = PresenterFactory::select(&config, None, &resolver).unwrap();
        assert_eq!(chosen.presenter.strategy(), IndicatorStrategy::Scene);
        assert_eq!(chosen.indicator_key, Some(ResolvedSceneKey::native("Spinner")));

        let overridden =
            PresenterFactory::select(&config, Some(IndicatorStrategy::Overlay), &resolver).unwrap();
        assert_eq!(overridden.presenter.strategy(), IndicatorStrategy::Overlay);
        assert!(overridden.indicator_key.is_none());
    }
}
