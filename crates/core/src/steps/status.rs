use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{collab::TransitionStatus, context::TransitionContext, CancellationToken, Result};

/// Reports a milestone to the request's event sink.
#[derive(Debug, Clone, Copy)]
pub struct EmitStatusStep {
    status: TransitionStatus,
}

impl EmitStatusStep {
    pub fn new(status: TransitionStatus) -> Self {
        Self { status }
    }
}

#[async_trait]
impl TransitionStep for EmitStatusStep {
    fn kind(&self) -> StepKind {
        StepKind::EmitStatus(self.status)
    }

    async fn execute(&self, ctx: &mut TransitionContext, _token: &CancellationToken) -> Result<()> {
        ctx.emit(self.status);
        Ok(())
    }
}
