//! Per-run state threaded through every step of one transition.

mod plan;

use std::sync::Arc;

pub use plan::{CleanupPlan, Compensation, IndicatorHandle};

use crate::{
    collab::{Fader, InputBlocker, TransitionStatus},
    config::AppConfig,
    gate::GateRegistry,
    key::{ResolvedSceneKey, SceneKeyResolver},
    loader::{ContentHandle, ContentLoader},
    presenter::{LoadingPresenter, PresenterFactory},
    quarantine::SpillQuarantine,
    runner::TransitionRequest,
    steps::CleanupReport,
    world::{ScenePhase, SceneRef, SceneWorld},
    Result,
};

/// Long-lived collaborators shared by every transition a runner executes.
pub struct TransitionServices {
    pub world: SceneWorld,
    pub loader: Arc<dyn ContentLoader>,
    pub resolver: SceneKeyResolver,
    pub fader: Option<Arc<dyn Fader>>,
    pub input: Option<Arc<dyn InputBlocker>>,
    pub config: AppConfig,
}

impl std::fmt::Debug for TransitionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionServices")
            .field("world", &self.world)
            .field("fader", &self.fader.is_some())
            .field("input", &self.input.is_some())
            .finish_non_exhaustive()
    }
}

/// Mutable state for one run. Created fresh by the runner and dropped when
/// the run ends.
pub struct TransitionContext {
    request: TransitionRequest,
    key: ResolvedSceneKey,
    services: Arc<TransitionServices>,
    quarantine: SpillQuarantine,
    presenter: Option<Arc<dyn LoadingPresenter>>,
    indicator_key: Option<ResolvedSceneKey>,
    origin: Vec<SceneRef>,
    plan: CleanupPlan,
    committed: Option<SceneRef>,
    progress: f32,
    cleanup: Option<CleanupReport>,
}

impl TransitionContext {
    /// Snapshots the origin scenes and the active scene before anything moves.
    /// Retained helper scenes (scratch, indicator) never count as origin.
    pub fn new(
        request: TransitionRequest,
        key: ResolvedSceneKey,
        services: Arc<TransitionServices>,
    ) -> Result<Self> {
        let world = services.world.clone();
        let mut origin = Vec::new();
        for scene in world.loaded_scenes()? {
            if !world.is_retained(scene.id)? {
                origin.push(scene);
            }
        }
        let previous_active = world.active_scene()?;
        Ok(Self {
            request,
            key,
            quarantine: SpillQuarantine::new(world),
            services,
            presenter: None,
            indicator_key: None,
            origin,
            plan: CleanupPlan::new(previous_active),
            committed: None,
            progress: 0.0,
            cleanup: None,
        })
    }

    pub fn request(&self) -> &TransitionRequest {
        &self.request
    }

    pub fn key(&self) -> &ResolvedSceneKey {
        &self.key
    }

    pub fn services(&self) -> &TransitionServices {
        &self.services
    }

    pub fn world(&self) -> &SceneWorld {
        &self.services.world
    }

    pub fn loader(&self) -> Arc<dyn ContentLoader> {
        self.services.loader.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.services.config
    }

    pub fn gates(&self) -> &GateRegistry {
        &self.request.gates
    }

    pub fn origin(&self) -> &[SceneRef] {
        &self.origin
    }

    pub fn plan(&self) -> &CleanupPlan {
        &self.plan
    }

    pub fn plan_mut(&mut self) -> &mut CleanupPlan {
        &mut self.plan
    }

    pub fn quarantine(&self) -> &SpillQuarantine {
        &self.quarantine
    }

    pub fn quarantine_mut(&mut self) -> &mut SpillQuarantine {
        &mut self.quarantine
    }

    /// Name of the scratch scene this run quarantines into.
    pub fn quarantine_name(&self) -> &str {
        self.request
            .quarantine_name
            .as_deref()
            .unwrap_or(&self.services.config.quarantine.scene_name)
    }

    /// Whether the scratch scene is unloaded once its objects are handed over.
    pub fn unload_scratch_after_flush(&self) -> bool {
        self.request
            .unload_scratch_after_flush
            .unwrap_or(self.services.config.quarantine.unload_after_flush)
    }

    pub fn destination(&self) -> Option<&ContentHandle> {
        self.plan.destination()
    }

    /// Destination scene once it is active and integrated. From then on an
    /// abort no longer unloads it.
    pub fn committed_destination(&self) -> Option<&SceneRef> {
        self.committed.as_ref()
    }

    /// Scene the run is moving to, whether still compensable or committed.
    pub fn destination_scene(&self) -> Option<&SceneRef> {
        self.plan
            .destination()
            .map(|handle| handle.scene())
            .or(self.committed.as_ref())
    }

    /// Drops the destination from the cleanup plan once it is both active
    /// and integrated. Returns whether the destination is committed.
    pub(crate) fn commit_destination_if_settled(&mut self) -> Result<bool> {
        let Some(handle) = self.plan.destination() else {
            return Ok(self.committed.is_some());
        };
        let scene = handle.scene().clone();
        let world = &self.services.world;
        let active = world.active_scene()?.map(|active| active.id) == Some(scene.id);
        let integrated = world.phase(scene.id)? == Some(ScenePhase::Integrated);
        if !(active && integrated) {
            return Ok(false);
        }
        self.plan.take_destination();
        self.plan.clear_restore();
        if !self.request.additive {
            let replaced = world.replace_with(scene.id)?;
            tracing::debug!(scene = %scene, replaced = replaced.len(), "origin replaced");
        }
        tracing::debug!(scene = %scene, "destination committed");
        self.committed = Some(scene);
        Ok(true)
    }

    /// Report left by the most recent cleanup step.
    pub fn take_cleanup_report(&mut self) -> Option<CleanupReport> {
        self.cleanup.take()
    }

    pub(crate) fn record_cleanup(&mut self, report: CleanupReport) {
        self.cleanup = Some(report);
    }

    /// Last load progress reported for the destination.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub(crate) fn set_progress(&mut self, progress: f32) {
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
    }

    pub fn indicator_key(&self) -> Option<&ResolvedSceneKey> {
        self.indicator_key.as_ref()
    }

    /// Presenter for this run, chosen on first use and fixed afterwards.
    pub fn presenter(&mut self) -> Result<Arc<dyn LoadingPresenter>> {
        if let Some(presenter) = &self.presenter {
            return Ok(presenter.clone());
        }
        let selection = PresenterFactory::select(
            &self.services.config.loading,
            self.request.indicator_strategy,
            &self.services.resolver,
        )?;
        tracing::debug!(strategy = ?selection.presenter.strategy(), "loading presenter selected");
        self.indicator_key = selection.indicator_key;
        self.presenter = Some(selection.presenter.clone());
        Ok(selection.presenter)
    }

    /// Presenter already chosen for this run, if any.
    pub fn chosen_presenter(&self) -> Option<Arc<dyn LoadingPresenter>> {
        self.presenter.clone()
    }

    pub fn emit(&self, status: TransitionStatus) {
        if let Some(events) = &self.request.events {
            events.emit(status);
        }
    }
}

impl std::fmt::Debug for TransitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionContext")
            .field("key", &self.key)
            .field("origin", &self.origin)
            .field("plan", &self.plan)
            .field("committed", &self.committed)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}
