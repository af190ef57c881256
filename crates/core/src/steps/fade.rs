use std::time::Duration;

use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{context::TransitionContext, CancellationToken, Result};

#[derive(Debug, Clone, Copy)]
pub struct FadeOutStep {
    duration: Duration,
}

impl FadeOutStep {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl TransitionStep for FadeOutStep {
    fn kind(&self) -> StepKind {
        StepKind::FadeOut
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        match &ctx.services().fader {
            Some(fader) => fader.fade_out(self.duration, token).await,
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FadeInStep {
    duration: Duration,
}

impl FadeInStep {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl TransitionStep for FadeInStep {
    fn kind(&self) -> StepKind {
        StepKind::FadeIn
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        match &ctx.services().fader {
            Some(fader) => fader.fade_in(self.duration, token).await,
            None => Ok(()),
        }
    }
}
