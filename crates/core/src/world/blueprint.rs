use serde::{Deserialize, Serialize};

use super::Transform;

fn default_load_steps() -> u32 {
    4
}

/// Description of a scene a backend knows how to instantiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBlueprint {
    pub name: String,
    #[serde(default)]
    pub objects: Vec<ObjectBlueprint>,
    /// Number of progress increments a backend reports while loading.
    #[serde(default = "default_load_steps")]
    pub load_steps: u32,
}

impl SceneBlueprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            load_steps: default_load_steps(),
        }
    }

    pub fn with_object(mut self, object: ObjectBlueprint) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_load_steps(mut self, steps: u32) -> Self {
        self.load_steps = steps;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectBlueprint {
    pub name: String,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub children: Vec<ObjectBlueprint>,
}

impl ObjectBlueprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: ObjectBlueprint) -> Self {
        self.children.push(child);
        self
    }
}
