use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{context::TransitionContext, CancellationToken, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockInputStep;

#[async_trait]
impl TransitionStep for BlockInputStep {
    fn kind(&self) -> StepKind {
        StepKind::BlockInput
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        if ctx.plan().input_blocked() {
            return Ok(());
        }
        if let Some(input) = &ctx.services().input {
            input.block();
            ctx.plan_mut().set_input_blocked(true);
        }
        Ok(())
    }
}

/// Releases input. Runs even when the token has fired so a finished
/// transition never leaves input blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnblockInputStep;

#[async_trait]
impl TransitionStep for UnblockInputStep {
    fn kind(&self) -> StepKind {
        StepKind::UnblockInput
    }

    async fn execute(&self, ctx: &mut TransitionContext, _token: &CancellationToken) -> Result<()> {
        if !ctx.plan().input_blocked() {
            return Ok(());
        }
        if let Some(input) = &ctx.services().input {
            input.unblock();
        }
        ctx.plan_mut().set_input_blocked(false);
        Ok(())
    }
}
