use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{
    context::TransitionContext,
    loader::{LoadOptions, ProgressSink},
    runner::UnloadPolicy,
    world::SceneRef,
    CancellationToken, Result, SceneSwitchError,
};

/// Unloads the scenes the run is leaving behind.
#[derive(Debug, Clone, Copy)]
pub struct UnloadOriginStep {
    policy: UnloadPolicy,
}

impl UnloadOriginStep {
    pub fn new(policy: UnloadPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl TransitionStep for UnloadOriginStep {
    fn kind(&self) -> StepKind {
        StepKind::UnloadOrigin
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        let scenes: Vec<SceneRef> = match self.policy {
            UnloadPolicy::Keep => return Ok(()),
            UnloadPolicy::Origins => ctx.origin().to_vec(),
            UnloadPolicy::ActiveOnly => ctx
                .plan()
                .previous_active()
                .filter(|scene| ctx.origin().contains(scene))
                .cloned()
                .into_iter()
                .collect(),
        };
        if scenes.is_empty() {
            return Ok(());
        }

        ctx.plan_mut().mark_active_disturbed();
        let quarantine = ctx.quarantine_name().to_string();
        let report = ctx
            .loader()
            .unload_scenes(&scenes, Some(&quarantine), token)
            .await?;
        tracing::debug!(
            unloaded = report.unloaded.len(),
            kept_last = report.kept_last.len(),
            skipped = report.skipped.len(),
            "origin unloaded"
        );
        Ok(())
    }
}

/// Forwards load progress to the request's sink and remembers the highest
/// value seen.
struct ProgressRelay {
    sink: Option<Arc<dyn ProgressSink>>,
    last: Mutex<f32>,
}

impl ProgressRelay {
    fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sink,
            last: Mutex::new(0.0),
        }
    }

    fn last(&self) -> f32 {
        self.last.lock().map(|last| *last).unwrap_or(0.0)
    }
}

impl ProgressSink for ProgressRelay {
    fn report(&self, progress: f32) {
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if progress < *last {
            return;
        }
        *last = progress;
        if let Some(sink) = &self.sink {
            sink.report(progress);
        }
    }
}

/// Loads the destination and records it in the cleanup plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadDestinationStep;

#[async_trait]
impl TransitionStep for LoadDestinationStep {
    fn kind(&self) -> StepKind {
        StepKind::LoadDestination
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        if ctx.plan().destination_loaded() {
            return Ok(());
        }
        let request = ctx.request();
        // Loaded next to the origin; a non-additive run replaces the rest
        // only once the destination commits, so an abort can still restore.
        let options = LoadOptions {
            additive: true,
            activate_on_load: request.activate_on_load,
        };
        let relay = ProgressRelay::new(request.progress.clone());
        let parent = request.parent.clone();
        let key = ctx.key().clone();

        ctx.plan_mut().mark_active_disturbed();
        let handle = ctx
            .loader()
            .load(&key, options, &relay, &parent, token)
            .await?;

        ctx.set_progress(relay.last());
        tracing::info!(key = %key, scene = %handle.scene(), "destination loaded");
        ctx.plan_mut().record_destination(handle);
        Ok(())
    }
}

/// Makes the destination the active scene.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetActiveStep;

#[async_trait]
impl TransitionStep for SetActiveStep {
    fn kind(&self) -> StepKind {
        StepKind::SetActive
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        let scene = ctx
            .destination_scene()
            .cloned()
            .ok_or_else(|| SceneSwitchError::InvalidRequest("no destination to activate".to_string()))?;
        ctx.plan_mut().mark_active_disturbed();
        ctx.world().set_active(scene.id)?;
        ctx.commit_destination_if_settled()?;
        Ok(())
    }
}

/// Integrates a destination that was loaded staged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivateStep;

#[async_trait]
impl TransitionStep for ActivateStep {
    fn kind(&self) -> StepKind {
        StepKind::Activate
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        let Some(handle) = ctx.destination().cloned() else {
            return Ok(());
        };
        ctx.loader().activate(&handle, token).await?;
        ctx.commit_destination_if_settled()?;
        Ok(())
    }
}
