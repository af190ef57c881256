use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{config::SceneEntry, world::SceneWorld, Result, SceneSwitchError};

/// Loading backend that owns a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Scenes built into the application.
    Native,
    /// Scenes fetched on demand from a remote catalog.
    Remote,
}

/// Logical reference to a scene as callers spell it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SceneReference {
    /// Look the name up in the catalog, then in the native build list.
    Named(String),
    /// Bypass the catalog and load a native scene directly.
    Native(String),
    /// Bypass the catalog and fetch a remote address directly.
    Remote(String),
}

impl SceneReference {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) | Self::Native(name) | Self::Remote(name) => name,
        }
    }
}

impl From<&str> for SceneReference {
    fn from(value: &str) -> Self {
        Self::named(value)
    }
}

impl fmt::Display for SceneReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Backend-specific identifier for one logical scene.
///
/// Exactly one backend is authoritative; the constructors guarantee that the
/// identifier for that backend is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedSceneKey {
    native_id: Option<String>,
    remote_id: Option<String>,
    backend: Backend,
}

impl ResolvedSceneKey {
    pub fn native(id: impl Into<String>) -> Self {
        Self {
            native_id: Some(id.into()),
            remote_id: None,
            backend: Backend::Native,
        }
    }

    pub fn remote(address: impl Into<String>) -> Self {
        Self {
            native_id: None,
            remote_id: Some(address.into()),
            backend: Backend::Remote,
        }
    }

    /// Keeps the non-authoritative identifier around for diagnostics.
    pub fn with_alternate(mut self, id: impl Into<String>) -> Self {
        match self.backend {
            Backend::Native => self.remote_id = Some(id.into()),
            Backend::Remote => self.native_id = Some(id.into()),
        }
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn native_id(&self) -> Option<&str> {
        self.native_id.as_deref()
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Identifier of the authoritative backend.
    pub fn id(&self) -> &str {
        let id = match self.backend {
            Backend::Native => self.native_id.as_deref(),
            Backend::Remote => self.remote_id.as_deref(),
        };
        id.unwrap_or_default()
    }
}

impl fmt::Display for ResolvedSceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend {
            Backend::Native => write!(f, "native:{}", self.id()),
            Backend::Remote => write!(f, "remote:{}", self.id()),
        }
    }
}

/// Maps logical scene references to resolved keys.
#[derive(Debug, Clone)]
pub struct SceneKeyResolver {
    catalog: HashMap<String, SceneEntry>,
    world: SceneWorld,
}

impl SceneKeyResolver {
    pub fn new(world: SceneWorld, entries: &[SceneEntry]) -> Self {
        let catalog = entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.clone()))
            .collect();
        Self { catalog, world }
    }

    pub fn resolve(&self, reference: &SceneReference) -> Result<ResolvedSceneKey> {
        match reference {
            SceneReference::Native(id) => Ok(ResolvedSceneKey::native(id.clone())),
            SceneReference::Remote(address) => Ok(ResolvedSceneKey::remote(address.clone())),
            SceneReference::Named(name) => {
                if let Some(entry) = self.catalog.get(name) {
                    return resolve_entry(entry);
                }
                if self.world.has_blueprint(name)? {
                    return Ok(ResolvedSceneKey::native(name.clone()));
                }
                Err(SceneSwitchError::not_found(name.clone()))
            }
        }
    }
}

fn resolve_entry(entry: &SceneEntry) -> Result<ResolvedSceneKey> {
    match entry.backend {
        Backend::Native => {
            let id = entry.native_id.clone().unwrap_or_else(|| entry.name.clone());
            let key = ResolvedSceneKey::native(id);
            Ok(match &entry.remote_address {
                Some(address) => key.with_alternate(address.clone()),
                None => key,
            })
        }
        Backend::Remote => {
            let address = entry.remote_address.clone().ok_or_else(|| {
                SceneSwitchError::InvalidRequest(format!(
                    "scene `{}` is marked remote but has no address",
                    entry.name
                ))
            })?;
            let key = ResolvedSceneKey::remote(address);
            Ok(match &entry.native_id {
                Some(id) => key.with_alternate(id.clone()),
                None => key,
            })
        }
    }
}
