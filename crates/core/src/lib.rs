//! Core library for the Scene Switch transition engine.
//!
//! A transition moves the application from the scenes it currently presents
//! to a destination scene. The runner sequences the work as a list of steps
//! (input blocking, fades, gates, loading indicator, unload, load, activation
//! and spill quarantine) and undoes whatever was committed if a step fails or
//! the run is cancelled.

pub mod cancel;
pub mod collab;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod key;
pub mod loader;
pub mod presenter;
pub mod quarantine;
pub mod runner;
pub mod steps;
pub mod world;

#[cfg(test)]
mod test_support;

pub use cancel::CancellationToken;
pub use collab::{
    ChannelEvents, CountingInputBlocker, Fader, InputBlocker, ParentScope, TimedFader,
    TracingEvents, TransitionEvents, TransitionStatus,
};
pub use config::{AppConfig, IndicatorStrategy, SceneEntry};
pub use context::{CleanupPlan, TransitionContext, TransitionServices};
pub use error::{LoadFailureKind, Result, SceneSwitchError};
pub use gate::{GateId, GateRegistry, GateWait};
pub use key::{Backend, ResolvedSceneKey, SceneKeyResolver, SceneReference};
pub use loader::{
    ContentHandle, ContentLoader, DispatchingLoader, InMemoryRemoteCatalog, LoadOptions,
    NativeContentLoader, ProgressSink, RemoteContentLoader,
};
pub use presenter::{LoadingPresenter, PresenterFactory};
pub use quarantine::SpillQuarantine;
pub use runner::{TransitionOutcome, TransitionRequest, TransitionRunner, UnloadPolicy};
pub use steps::{CleanupReport, StepKind, TransitionStep};
pub use world::{SceneBlueprint, SceneWorld};
