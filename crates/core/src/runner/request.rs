use std::{fmt, sync::Arc, time::Duration};

use crate::{
    collab::{ParentScope, TransitionEvents},
    config::IndicatorStrategy,
    gate::GateRegistry,
    key::SceneReference,
    loader::ProgressSink,
    Result, SceneSwitchError,
};

/// Which of the scenes loaded at the start of a run get unloaded before the
/// destination comes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnloadPolicy {
    /// Every non-retained scene that was loaded when the run started.
    #[default]
    Origins,
    /// Only the scene that was active when the run started.
    ActiveOnly,
    /// Nothing is unloaded explicitly.
    Keep,
}

/// Wait on [`GateId::AfterLoad`](crate::gate::GateId::AfterLoad) once the
/// destination is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AfterLoadGate {
    /// Falls back to the configured timeout; with neither set the run waits
    /// until the gate opens.
    pub timeout: Option<Duration>,
}

/// Everything one transition should do. The runner takes it by value and
/// only ever reads it.
#[derive(Clone)]
pub struct TransitionRequest {
    pub destination: SceneReference,
    pub additive: bool,
    pub activate_on_load: bool,
    pub unload_policy: UnloadPolicy,
    pub quarantine: bool,
    /// Overrides the configured scratch scene name.
    pub quarantine_name: Option<String>,
    /// Overrides the configured unload-after-flush setting.
    pub unload_scratch_after_flush: Option<bool>,
    pub events: Option<Arc<dyn TransitionEvents>>,
    pub show_loading_indicator: bool,
    pub indicator_strategy: Option<IndicatorStrategy>,
    pub gate_before_unload: bool,
    pub gate_after_load: Option<AfterLoadGate>,
    /// Pause between loading and activation.
    pub settle_delay: Option<Duration>,
    pub fade: bool,
    pub fade_out: Option<Duration>,
    pub fade_in: Option<Duration>,
    pub block_input: bool,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub parent: ParentScope,
    /// Gates the caller opens while the run waits on them.
    pub gates: GateRegistry,
}

impl TransitionRequest {
    /// Non-additive switch to `destination` with fades and input blocking.
    pub fn to(destination: impl Into<SceneReference>) -> Self {
        Self {
            destination: destination.into(),
            additive: false,
            activate_on_load: true,
            unload_policy: UnloadPolicy::Origins,
            quarantine: false,
            quarantine_name: None,
            unload_scratch_after_flush: None,
            events: None,
            show_loading_indicator: false,
            indicator_strategy: None,
            gate_before_unload: false,
            gate_after_load: None,
            settle_delay: None,
            fade: true,
            fade_out: None,
            fade_in: None,
            block_input: true,
            progress: None,
            parent: ParentScope::default(),
            gates: GateRegistry::new(),
        }
    }

    /// Loads next to the current scenes and unloads nothing.
    pub fn additive(mut self) -> Self {
        self.additive = true;
        self.unload_policy = UnloadPolicy::Keep;
        self
    }

    pub fn activate_on_load(mut self, activate: bool) -> Self {
        self.activate_on_load = activate;
        self
    }

    pub fn unload_policy(mut self, policy: UnloadPolicy) -> Self {
        self.unload_policy = policy;
        self
    }

    /// Quarantines spills into the configured scratch scene.
    pub fn with_quarantine(mut self) -> Self {
        self.quarantine = true;
        self
    }

    pub fn with_quarantine_named(mut self, name: impl Into<String>) -> Self {
        self.quarantine = true;
        self.quarantine_name = Some(name.into());
        self
    }

    pub fn unload_scratch_after_flush(mut self, unload: bool) -> Self {
        self.unload_scratch_after_flush = Some(unload);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn TransitionEvents>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_loading_indicator(mut self) -> Self {
        self.show_loading_indicator = true;
        self
    }

    pub fn indicator_strategy(mut self, strategy: IndicatorStrategy) -> Self {
        self.indicator_strategy = Some(strategy);
        self
    }

    pub fn gate_before_unload(mut self) -> Self {
        self.gate_before_unload = true;
        self
    }

    pub fn gate_after_load(mut self, timeout: Option<Duration>) -> Self {
        self.gate_after_load = Some(AfterLoadGate { timeout });
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    pub fn without_fade(mut self) -> Self {
        self.fade = false;
        self
    }

    pub fn fade_durations(mut self, fade_out: Duration, fade_in: Duration) -> Self {
        self.fade = true;
        self.fade_out = Some(fade_out);
        self.fade_in = Some(fade_in);
        self
    }

    pub fn without_input_block(mut self) -> Self {
        self.block_input = false;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn parent(mut self, parent: ParentScope) -> Self {
        self.parent = parent;
        self
    }

    pub fn gates(mut self, gates: GateRegistry) -> Self {
        self.gates = gates;
        self
    }

    /// Rejects requests that cannot be turned into a pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.destination.label().trim().is_empty() {
            return Err(SceneSwitchError::InvalidRequest(
                "destination must not be empty".to_string(),
            ));
        }
        if self
            .quarantine_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(SceneSwitchError::InvalidRequest(
                "quarantine scene name must not be empty".to_string(),
            ));
        }
        if self.quarantine_name.as_deref() == Some(self.destination.label()) {
            return Err(SceneSwitchError::InvalidRequest(format!(
                "`{}` cannot be both the destination and the quarantine scene",
                self.destination
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for TransitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRequest")
            .field("destination", &self.destination)
            .field("additive", &self.additive)
            .field("activate_on_load", &self.activate_on_load)
            .field("unload_policy", &self.unload_policy)
            .field("quarantine", &self.quarantine)
            .field("quarantine_name", &self.quarantine_name)
            .field("show_loading_indicator", &self.show_loading_indicator)
            .field("gate_before_unload", &self.gate_before_unload)
            .field("gate_after_load", &self.gate_after_load)
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}
