use async_trait::async_trait;

use super::{StepKind, TransitionStep};
use crate::{context::TransitionContext, CancellationToken, Result, SceneSwitchError};

#[derive(Debug, Clone, Copy, Default)]
pub struct QuarantinePrepareStep;

#[async_trait]
impl TransitionStep for QuarantinePrepareStep {
    fn kind(&self) -> StepKind {
        StepKind::QuarantinePrepare
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        token.check()?;
        let name = ctx.quarantine_name().to_string();
        ctx.quarantine_mut().prepare(&name)?;
        ctx.plan_mut().set_quarantine_prepared(true);
        Ok(())
    }
}

/// Hands quarantined objects to the destination.
#[derive(Debug, Clone, Copy)]
pub struct QuarantineFlushStep {
    unload_scratch: bool,
}

impl QuarantineFlushStep {
    pub fn new(unload_scratch: bool) -> Self {
        Self { unload_scratch }
    }
}

#[async_trait]
impl TransitionStep for QuarantineFlushStep {
    fn kind(&self) -> StepKind {
        StepKind::QuarantineFlush
    }

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()> {
        let destination = ctx.destination_scene().cloned().ok_or_else(|| {
            SceneSwitchError::InvalidRequest("quarantine flush needs a loaded destination".to_string())
        })?;
        let report = ctx
            .quarantine_mut()
            .flush_to(&destination, self.unload_scratch, token)
            .await?;
        ctx.plan_mut().set_quarantine_prepared(false);
        tracing::debug!(moved = report.moved, destination = %destination, "spill flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        steps::{LoadDestinationStep, SetActiveStep},
        test_support::Fixture,
        world::Transform,
        TransitionRequest,
    };

    #[tokio::test]
    async fn objects_spawned_mid_transition_land_in_the_destination() {
        let fixture = Fixture::new();
        let mut ctx = fixture.context(TransitionRequest::to("Level2"));
        let token = CancellationToken::new();

        QuarantinePrepareStep.execute(&mut ctx, &token).await.unwrap();
        assert!(ctx.plan().quarantine_prepared());
        let stray = fixture
            .world
            .spawn("Stray", Transform::at([1.0, 2.0, 3.0]))
            .unwrap();

        LoadDestinationStep.execute(&mut ctx, &token).await.unwrap();
        SetActiveStep.execute(&mut ctx, &token).await.unwrap();
        QuarantineFlushStep::new(true)
            .execute(&mut ctx, &token)
            .await
            .unwrap();

        let level = fixture.world.find_scene("Level2").unwrap().unwrap();
        let info = fixture.world.object(stray).unwrap().unwrap();
        assert_eq!(info.scene, Some(level.id));
        assert_eq!(info.local, Transform::at([1.0, 2.0, 3.0]));
        assert!(fixture.world.find_scene("Scratch").unwrap().is_none());
        assert!(!ctx.plan().quarantine_prepared());
        assert_eq!(fixture.world.spawn_redirect().unwrap(), None);
    }

    #[tokio::test]
    async fn flush_without_destination_is_rejected() {
        let fixture = Fixture::new();
        let mut ctx = fixture.context(TransitionRequest::to("Level2"));
        let err = QuarantineFlushStep::new(true)
            .execute(&mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SceneSwitchError::InvalidRequest(_)));
    }
}
