use std::fmt;

use crate::{
    loader::ContentHandle,
    world::{ObjectId, SceneRef},
};

/// Whatever a loading presenter created to show the indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorHandle {
    Overlay(ObjectId),
    Scene(ContentHandle),
}

/// One compensating action, derived from what a run has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    UnloadDestination(ContentHandle),
    HideIndicator,
    RestoreActive(SceneRef),
    SettleQuarantine,
    UnblockInput,
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnloadDestination(handle) => write!(f, "unload-destination({})", handle.scene()),
            Self::HideIndicator => f.write_str("hide-indicator"),
            Self::RestoreActive(scene) => write!(f, "restore-active({scene})"),
            Self::SettleQuarantine => f.write_str("settle-quarantine"),
            Self::UnblockInput => f.write_str("unblock-input"),
        }
    }
}

/// Running record of what a transition has committed so far.
///
/// A handle is present exactly while the resource it names is live and would
/// need undoing on abort.
#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    destination: Option<ContentHandle>,
    indicator: Option<IndicatorHandle>,
    quarantine_prepared: bool,
    restore_previous_active: bool,
    previous_active: Option<SceneRef>,
    input_blocked: bool,
}

impl CleanupPlan {
    pub fn new(previous_active: Option<SceneRef>) -> Self {
        Self {
            previous_active,
            ..Self::default()
        }
    }

    pub fn destination(&self) -> Option<&ContentHandle> {
        self.destination.as_ref()
    }

    pub fn destination_loaded(&self) -> bool {
        self.destination.is_some()
    }

    pub fn record_destination(&mut self, handle: ContentHandle) {
        self.destination = Some(handle);
    }

    /// Forgets the destination once it no longer needs compensating.
    pub fn take_destination(&mut self) -> Option<ContentHandle> {
        self.destination.take()
    }

    pub fn indicator(&self) -> Option<&IndicatorHandle> {
        self.indicator.as_ref()
    }

    pub fn indicator_loaded(&self) -> bool {
        self.indicator.is_some()
    }

    pub fn record_indicator(&mut self, handle: IndicatorHandle) {
        self.indicator = Some(handle);
    }

    pub fn take_indicator(&mut self) -> Option<IndicatorHandle> {
        self.indicator.take()
    }

    pub fn quarantine_prepared(&self) -> bool {
        self.quarantine_prepared
    }

    pub fn set_quarantine_prepared(&mut self, prepared: bool) {
        self.quarantine_prepared = prepared;
    }

    pub fn previous_active(&self) -> Option<&SceneRef> {
        self.previous_active.as_ref()
    }

    pub fn restore_previous_active(&self) -> bool {
        self.restore_previous_active
    }

    /// Notes that the active scene may have been disturbed and should be put
    /// back on abort.
    pub fn mark_active_disturbed(&mut self) {
        if self.previous_active.is_some() {
            self.restore_previous_active = true;
        }
    }

    pub fn clear_restore(&mut self) {
        self.restore_previous_active = false;
    }

    pub fn input_blocked(&self) -> bool {
        self.input_blocked
    }

    pub fn set_input_blocked(&mut self, blocked: bool) {
        self.input_blocked = blocked;
    }

    /// Compensations for everything still committed, in execution order.
    pub fn compensations(&self) -> Vec<Compensation> {
        let mut actions = Vec::new();
        if let Some(handle) = &self.destination {
            actions.push(Compensation::UnloadDestination(handle.clone()));
        }
        if self.indicator.is_some() {
            actions.push(Compensation::HideIndicator);
        }
        if self.restore_previous_active {
            if let Some(previous) = &self.previous_active {
                actions.push(Compensation::RestoreActive(previous.clone()));
            }
        }
        if self.quarantine_prepared {
            actions.push(Compensation::SettleQuarantine);
        }
        if self.input_blocked {
            actions.push(Compensation::UnblockInput);
        }
        actions
    }

    pub fn is_clean(&self) -> bool {
        self.compensations().is_empty()
    }
}
