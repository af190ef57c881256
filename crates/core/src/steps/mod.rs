//! Step vocabulary.
//!
//! Every stage of a transition is a value with a single `execute` operation.
//! The runner builds the list per request, leaving out whatever the request
//! does not ask for, so each step can be exercised on its own.

mod cleanup;
mod content;
mod fade;
mod gate;
mod input;
mod loading;
mod quarantine;
mod status;

use std::fmt;

use async_trait::async_trait;

pub use cleanup::{compensate, CleanupReport, CleanupStep};
pub use content::{ActivateStep, LoadDestinationStep, SetActiveStep, UnloadOriginStep};
pub use fade::{FadeInStep, FadeOutStep};
pub use gate::{DelayStep, TimedGateStep, WaitGateStep};
pub use input::{BlockInputStep, UnblockInputStep};
pub use loading::{HideLoadingStep, ShowLoadingStep};
pub use quarantine::{QuarantineFlushStep, QuarantinePrepareStep};
pub use status::EmitStatusStep;

use crate::{
    collab::TransitionStatus, context::TransitionContext, gate::GateId, CancellationToken,
    Result,
};

/// Identifies a step in a built plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    BlockInput,
    EmitStatus(TransitionStatus),
    FadeOut,
    WaitGate(GateId),
    WaitGateTimeout(GateId),
    ShowLoading,
    UnloadOrigin,
    QuarantinePrepare,
    LoadDestination,
    Delay,
    SetActive,
    Activate,
    QuarantineFlush,
    HideLoading,
    FadeIn,
    UnblockInput,
    Cleanup,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockInput => f.write_str("block-input"),
            Self::EmitStatus(status) => write!(f, "emit({status})"),
            Self::FadeOut => f.write_str("fade-out"),
            Self::WaitGate(gate) => write!(f, "wait-gate({gate})"),
            Self::WaitGateTimeout(gate) => write!(f, "wait-gate-timeout({gate})"),
            Self::ShowLoading => f.write_str("show-indicator"),
            Self::UnloadOrigin => f.write_str("unload-origin"),
            Self::QuarantinePrepare => f.write_str("quarantine-prepare"),
            Self::LoadDestination => f.write_str("load-destination"),
            Self::Delay => f.write_str("delay"),
            Self::SetActive => f.write_str("set-active"),
            Self::Activate => f.write_str("activate"),
            Self::QuarantineFlush => f.write_str("quarantine-flush"),
            Self::HideLoading => f.write_str("hide-indicator"),
            Self::FadeIn => f.write_str("fade-in"),
            Self::UnblockInput => f.write_str("unblock-input"),
            Self::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// One pipeline operation.
#[async_trait]
pub trait TransitionStep: Send + Sync {
    fn kind(&self) -> StepKind;

    async fn execute(&self, ctx: &mut TransitionContext, token: &CancellationToken) -> Result<()>;
}

impl fmt::Debug for dyn TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}
