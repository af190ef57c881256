//! In-process model of the host's loaded-content set.
//!
//! Loaders, the quarantine and the presenters all mutate the same
//! [`SceneWorld`]. It tracks which scenes are loaded, which one is active,
//! every object with its parent and local transform, and where newly spawned
//! objects land.

mod blueprint;
mod runtime;
mod transform;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use blueprint::{ObjectBlueprint, SceneBlueprint};
pub use runtime::{ObjectInfo, SceneWorld, UnloadOutcome};
pub use transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// A loaded content unit: its runtime id plus the name it was loaded under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneRef {
    pub id: SceneId,
    pub name: String,
}

impl fmt::Display for SceneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Whether a loaded scene has been integrated into the running application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePhase {
    /// Loaded but held back; needs an explicit activation.
    Staged,
    Integrated,
}
