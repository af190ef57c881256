use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{key::Backend, Result};

/// Top-level configuration structure for the transition engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transition: TransitionConfig,
    pub loading: LoadingConfig,
    pub gates: GateConfig,
    pub quarantine: QuarantineConfig,
    /// Catalog consulted by the scene key resolver.
    pub scenes: Vec<SceneEntry>,
}

impl AppConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Timing of the visual parts of a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub fade_out_ms: u64,
    pub fade_in_ms: u64,
    /// Interval between progress polls while a backend loads.
    pub progress_tick_ms: u64,
}

impl TransitionConfig {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            fade_out_ms: 250,
            fade_in_ms: 250,
            progress_tick_ms: 16,
        }
    }
}

/// Which loading indicator implementation a transition uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStrategy {
    /// A persistent overlay object that survives the unload/load window.
    Overlay,
    /// A dedicated indicator scene loaded additively.
    Scene,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    pub strategy: IndicatorStrategy,
    /// Logical name of the indicator scene used by [`IndicatorStrategy::Scene`].
    pub indicator_scene: String,
    /// Name given to the overlay object used by [`IndicatorStrategy::Overlay`].
    pub overlay_name: String,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            strategy: IndicatorStrategy::Overlay,
            indicator_scene: "Loading".to_string(),
            overlay_name: "LoadingOverlay".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Default timeout applied to the after-load gate when a request waits on
    /// it without its own timeout. `None` waits indefinitely.
    pub after_load_timeout_ms: Option<u64>,
}

impl GateConfig {
    pub fn after_load_timeout(&self) -> Option<Duration> {
        self.after_load_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarantineConfig {
    pub scene_name: String,
    pub unload_after_flush: bool,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            scene_name: "Scratch".to_string(),
            unload_after_flush: true,
        }
    }
}

/// Maps one logical scene name to the backend that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    pub name: String,
    pub backend: Backend,
    #[serde(default)]
    pub native_id: Option<String>,
    #[serde(default)]
    pub remote_address: Option<String>,
}
