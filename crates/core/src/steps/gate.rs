use std::time::Duration;

use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{
    context::TransitionContext,
    gate::{GateId, GateWait},
    CancellationToken, Result,
};

/// Suspends until the gate is opened by someone outside the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct WaitGateStep {
    gate: GateId,
}

impl WaitGateStep {
    pub fn new(gate: GateId) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl TransitionStep for WaitGateStep {
    fn kind(&self) -> StepKind {
        StepKind::WaitGate(self.gate)
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        tracing::debug!(gate = %self.gate, "waiting on gate");
        ctx.gates().wait(self.gate, token).await
    }
}

/// Waits on a gate for at most `timeout`, then carries on regardless.
#[derive(Debug, Clone, Copy)]
pub struct TimedGateStep {
    gate: GateId,
    timeout: Duration,
}

impl TimedGateStep {
    pub fn new(gate: GateId, timeout: Duration) -> Self {
        Self { gate, timeout }
    }
}

#[async_trait]
impl TransitionStep for TimedGateStep {
    fn kind(&self) -> StepKind {
        StepKind::WaitGateTimeout(self.gate)
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        match ctx
            .gates()
            .wait_with_timeout(self.gate, self.timeout, token)
            .await?
        {
            GateWait::Opened => tracing::debug!(gate = %self.gate, "gate opened"),
            GateWait::TimedOut => {
                tracing::info!(gate = %self.gate, timeout = ?self.timeout, "gate timed out, proceeding")
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DelayStep {
    duration: Duration,
}

impl DelayStep {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl TransitionStep for DelayStep {
    fn kind(&self) -> StepKind {
        StepKind::Delay
    }

    async fn execute(&self, _ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.sleep(self.duration).await
    }
}
