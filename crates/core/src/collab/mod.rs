//! Contracts for the collaborators a transition drives but does not own.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{CancellationToken, Result};

/// Milestones reported to UI and telemetry while a transition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    InputBlocked,
    ExitFade,
    UnloadOrigin,
    LoadDestination,
    LoadProgressComplete,
    DestinationActivated,
    EntryFade,
    InputUnblocked,
}

impl fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InputBlocked => "input-blocked",
            Self::ExitFade => "exit-fade",
            Self::UnloadOrigin => "unload-origin",
            Self::LoadDestination => "load-destination",
            Self::LoadProgressComplete => "load-progress-complete",
            Self::DestinationActivated => "destination-activated",
            Self::EntryFade => "entry-fade",
            Self::InputUnblocked => "input-unblocked",
        };
        f.write_str(label)
    }
}

/// Full-screen visual cover used around the unload/load window.
#[async_trait]
pub trait Fader: Send + Sync {
    /// Reveals the scene.
    async fn fade_in(&self, duration: Duration, token: &CancellationToken) -> Result<()>;
    /// Covers the scene.
    async fn fade_out(&self, duration: Duration, token: &CancellationToken) -> Result<()>;
}

/// Suppresses user input for the duration of a transition.
pub trait InputBlocker: Send + Sync {
    fn block(&self);
    fn unblock(&self);
}

/// Receives transition milestones.
pub trait TransitionEvents: Send + Sync {
    fn emit(&self, status: TransitionStatus);
}

/// Enclosing application scope newly loaded content resolves into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentScope {
    pub name: String,
}

impl ParentScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ParentScope {
    fn default() -> Self {
        Self::new("root")
    }
}

/// Fader that animates an opacity value in fixed ticks.
#[derive(Debug)]
pub struct TimedFader {
    tick: Duration,
    // 0.0 is fully revealed, 1.0 fully covered.
    cover: Mutex<f32>,
}

impl TimedFader {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
            cover: Mutex::new(0.0),
        }
    }

    pub fn cover(&self) -> f32 {
        self.cover.lock().map(|value| *value).unwrap_or(0.0)
    }

    async fn animate(&self, target: f32, duration: Duration, token: &CancellationToken) -> Result<()> {
        let start = self.cover();
        let ticks = (duration.as_millis() / self.tick.as_millis()).max(1) as u32;
        for step in 1..=ticks {
            token.sleep(self.tick.min(duration)).await?;
            let t = step as f32 / ticks as f32;
            self.set_cover(start + (target - start) * t);
        }
        self.set_cover(target);
        Ok(())
    }

    fn set_cover(&self, value: f32) {
        if let Ok(mut cover) = self.cover.lock() {
            *cover = value.clamp(0.0, 1.0);
        }
    }
}

#[async_trait]
impl Fader for TimedFader {
    async fn fade_in(&self, duration: Duration, token: &CancellationToken) -> Result<()> {
        self.animate(0.0, duration, token).await
    }

    async fn fade_out(&self, duration: Duration, token: &CancellationToken) -> Result<()> {
        self.animate(1.0, duration, token).await
    }
}

/// Input blocker that tracks nested block/unblock calls.
#[derive(Debug, Default)]
pub struct CountingInputBlocker {
    depth: AtomicUsize,
}

impl CountingInputBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

impl InputBlocker for CountingInputBlocker {
    fn block(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    fn unblock(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                Some(depth.saturating_sub(1))
            });
    }
}

/// Logs every milestone.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl TransitionEvents for TracingEvents {
    fn emit(&self, status: TransitionStatus) {
        tracing::info!(%status, "transition status");
    }
}

/// Forwards milestones into an unbounded channel. Dropped receivers are ignored.
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    sender: mpsc::UnboundedSender<TransitionStatus>,
}

impl ChannelEvents {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransitionStatus>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TransitionEvents for ChannelEvents {
    fn emit(&self, status: TransitionStatus) {
        let _ = self.sender.send(status);
    }
}
