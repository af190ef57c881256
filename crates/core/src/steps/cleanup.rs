use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{
    collab::TransitionStatus,
    context::{Compensation, TransitionContext},
    presenter::HideOutcome,
    world::UnloadOutcome,
    CancellationToken, Result,
};

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub performed: Vec<Compensation>,
    /// Compensations that failed, with the reason. Never propagated.
    pub failures: Vec<(Compensation, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Undoes whatever the plan still records.
///
/// `force` is set on abort and additionally unloads an uncommitted
/// destination and restores the previous active scene. Each compensation is
/// attempted independently; running again on a cleaned plan does nothing.
pub async fn compensate(ctx: &mut TransitionContext, force: bool) -> CleanupReport {
    // The run's token may already have fired, so teardown gets its own.
    let token = CancellationToken::new();
    let mut report = CleanupReport::default();

    for action in ctx.plan().compensations() {
        let needs_force = matches!(
            action,
            Compensation::UnloadDestination(_) | Compensation::RestoreActive(_)
        );
        if needs_force && !force {
            continue;
        }
        match apply(ctx, &action, &token).await {
            Ok(()) => report.performed.push(action),
            Err(reason) => {
                tracing::warn!(compensation = %action, %reason, "cleanup action failed");
                report.failures.push((action, reason));
            }
        }
    }
    report
}

async fn apply(
    ctx: &mut TransitionContext,
    action: &Compensation,
    token: &CancellationToken,
) -> std::result::Result<(), String> {
    match action {
        Compensation::UnloadDestination(handle) => {
            ctx.plan_mut().take_destination();
            match ctx.loader().unload(handle, token).await {
                Ok(UnloadOutcome::KeptLastScene) => {
                    Err(format!("{} is the last loaded scene", handle.scene()))
                }
                Ok(_) => Ok(()),
                Err(err) => Err(err.to_string()),
            }
        }
        Compensation::HideIndicator => match ctx.chosen_presenter() {
            Some(presenter) => match presenter.hide(ctx, token).await {
                HideOutcome::TeardownFailed(reason) => Err(reason),
                HideOutcome::Hidden | HideOutcome::NotShown => Ok(()),
            },
            None => {
                ctx.plan_mut().take_indicator();
                Err("indicator recorded without a presenter".to_string())
            }
        },
        Compensation::RestoreActive(previous) => {
            ctx.plan_mut().clear_restore();
            let world = ctx.world();
            match world.is_loaded(previous.id) {
                Ok(true) => world.set_active(previous.id).map_err(|err| err.to_string()),
                Ok(false) => {
                    tracing::debug!(scene = %previous, "previous active scene is gone, nothing to restore");
                    Ok(())
                }
                Err(err) => Err(err.to_string()),
            }
        }
        Compensation::SettleQuarantine => {
            ctx.plan_mut().set_quarantine_prepared(false);
            settle_quarantine(ctx, token).await.map_err(|err| err.to_string())
        }
        Compensation::UnblockInput => {
            if let Some(input) = &ctx.services().input {
                input.unblock();
            }
            ctx.plan_mut().set_input_blocked(false);
            ctx.emit(TransitionStatus::InputUnblocked);
            Ok(())
        }
    }
}

// Quarantined objects go to whatever scene is active now, or are left in
// scratch when there is no suitable home.
async fn settle_quarantine(ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
    let scratch = ctx.quarantine().scratch().cloned();
    let target = ctx
        .world()
        .active_scene()?
        .filter(|active| Some(active) != scratch.as_ref());
    match target {
        Some(target) => {
            let unload_scratch = ctx.unload_scratch_after_flush();
            let report = ctx
                .quarantine_mut()
                .flush_to(&target, unload_scratch, token)
                .await;
            if report.is_err() {
                ctx.quarantine_mut().abandon()?;
            }
            report.map(|_| ())
        }
        None => ctx.quarantine_mut().abandon(),
    }
}

/// Runs [`compensate`] as a pipeline step and leaves its report on the
/// context. Never fails: compensation failures are part of the report.
#[derive(Debug, Clone, Copy)]
pub struct CleanupStep {
    force: bool,
}

impl CleanupStep {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn forced() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl TransitionStep for CleanupStep {
    fn kind(&self) -> StepKind {
        StepKind::Cleanup
    }

    async fn execute(&self, ctx: &mut TransitionContext, _token: &CancellationToken) -> Result<()> {
        let report = compensate(ctx, self.force).await;
        tracing::debug!(
            force = self.force,
            performed = report.performed.len(),
            failed = report.failures.len(),
            "cleanup finished"
        );
        ctx.record_cleanup(report);
        Ok(())
    }
}
