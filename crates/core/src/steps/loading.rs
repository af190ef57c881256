use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{context::TransitionContext, presenter::HideOutcome, CancellationToken, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct ShowLoadingStep;

#[async_trait]
impl TransitionStep for ShowLoadingStep {
    fn kind(&self) -> StepKind {
        StepKind::ShowLoading
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        let presenter = ctx.presenter()?;
        presenter.show(ctx, token).await
    }
}

/// Hides the indicator. Teardown failures are logged and do not fail the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct HideLoadingStep;

#[async_trait]
impl TransitionStep for HideLoadingStep {
    fn kind(&self) -> StepKind {
        StepKind::HideLoading
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        let Some(presenter) = ctx.chosen_presenter() else {
            return Ok(());
        };
        if let HideOutcome::TeardownFailed(reason) = presenter.hide(ctx, token).await {
            tracing::warn!(%reason, "loading indicator teardown failed");
        }
        Ok(())
    }
}
