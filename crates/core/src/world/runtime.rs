use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use super::{ObjectBlueprint, ObjectId, SceneBlueprint, SceneId, ScenePhase, SceneRef, Transform};
use crate::{Result, SceneSwitchError};

/// Result of asking the world to unload one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    /// The scene was not loaded (already unloaded or never existed).
    NotLoaded,
    /// Refused: the scene is the last regular (non-retained) scene, or the
    /// only scene of any kind. The world never drops to zero loaded content.
    KeptLastScene,
}

/// Snapshot of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub name: String,
    /// Owning scene, `None` for persistent objects.
    pub scene: Option<SceneId>,
    pub parent: Option<ObjectId>,
    pub local: Transform,
}

#[derive(Debug)]
struct SceneRecord {
    name: String,
    phase: ScenePhase,
    retained: bool,
    scope: Option<String>,
}

#[derive(Debug, Default)]
struct WorldState {
    next_scene: u64,
    next_object: u64,
    blueprints: HashMap<String, SceneBlueprint>,
    // Ordered by id, which is load order.
    scenes: BTreeMap<SceneId, SceneRecord>,
    objects: BTreeMap<ObjectId, ObjectInfo>,
    active: Option<SceneId>,
    spawn_redirect: Option<SceneId>,
}

/// Shared handle to the process-wide loaded-content set.
#[derive(Clone, Default)]
pub struct SceneWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SceneWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scene to the native build catalog.
    pub fn register_blueprint(&self, blueprint: SceneBlueprint) -> Result<()> {
        let mut state = self.lock()?;
        state.blueprints.insert(blueprint.name.clone(), blueprint);
        Ok(())
    }

    pub fn blueprint(&self, name: &str) -> Result<Option<SceneBlueprint>> {
        Ok(self.lock()?.blueprints.get(name).cloned())
    }

    pub fn has_blueprint(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.blueprints.contains_key(name))
    }

    /// Creates a loaded scene and every object described by `blueprint`.
    ///
    /// The first integrated scene in an otherwise empty world becomes active.
    pub fn instantiate(
        &self,
        blueprint: &SceneBlueprint,
        phase: ScenePhase,
        scope: Option<&str>,
    ) -> Result<SceneRef> {
        let mut state = self.lock()?;
        let scene = state.insert_scene(&blueprint.name, phase, scope);
        for object in &blueprint.objects {
            state.insert_tree(scene.id, None, object);
        }
        if phase == ScenePhase::Integrated && state.active.is_none() {
            state.active = Some(scene.id);
        }
        Ok(scene)
    }

    /// Creates an empty, integrated scene.
    pub fn create_empty_scene(&self, name: &str, retained: bool) -> Result<SceneRef> {
        let mut state = self.lock()?;
        let scene = state.insert_scene(name, ScenePhase::Integrated, None);
        if let Some(record) = state.scenes.get_mut(&scene.id) {
            record.retained = retained;
        }
        if state.active.is_none() {
            state.active = Some(scene.id);
        }
        Ok(scene)
    }

    /// Finds the earliest loaded scene with the given name.
    pub fn find_scene(&self, name: &str) -> Result<Option<SceneRef>> {
        let state = self.lock()?;
        Ok(state
            .scenes
            .iter()
            .find(|(_, record)| record.name == name)
            .map(|(id, record)| SceneRef {
                id: *id,
                name: record.name.clone(),
            }))
    }

    pub fn is_loaded(&self, scene: SceneId) -> Result<bool> {
        Ok(self.lock()?.scenes.contains_key(&scene))
    }

    pub fn phase(&self, scene: SceneId) -> Result<Option<ScenePhase>> {
        Ok(self.lock()?.scenes.get(&scene).map(|record| record.phase))
    }

    pub fn scope(&self, scene: SceneId) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .scenes
            .get(&scene)
            .and_then(|record| record.scope.clone()))
    }

    pub fn loaded_scenes(&self) -> Result<Vec<SceneRef>> {
        Ok(self.lock()?.scene_refs())
    }

    pub fn loaded_count(&self) -> Result<usize> {
        Ok(self.lock()?.scenes.len())
    }

    /// Marks a scene as surviving non-additive loads.
    pub fn set_retained(&self, scene: SceneId, retained: bool) -> Result<()> {
        let mut state = self.lock()?;
        let record = state
            .scenes
            .get_mut(&scene)
            .ok_or_else(|| SceneSwitchError::msg(format!("{scene} is not loaded")))?;
        record.retained = retained;
        Ok(())
    }

    pub fn is_retained(&self, scene: SceneId) -> Result<bool> {
        Ok(self
            .lock()?
            .scenes
            .get(&scene)
            .map(|record| record.retained)
            .unwrap_or(false))
    }

    /// Integrates a staged scene. Integrating an integrated scene is a no-op.
    pub fn integrate(&self, scene: SceneId) -> Result<()> {
        let mut state = self.lock()?;
        let record = state
            .scenes
            .get_mut(&scene)
            .ok_or_else(|| SceneSwitchError::msg(format!("{scene} is not loaded")))?;
        record.phase = ScenePhase::Integrated;
        if state.active.is_none() {
            state.active = Some(scene);
        }
        Ok(())
    }

    /// Unloads a scene and destroys every object it owns.
    ///
    /// Retained helper scenes do not count as content: the last regular scene
    /// is kept even while an indicator or scratch scene is loaded, and a
    /// helper can always go as long as something else stays loaded.
    pub fn unload_scene(&self, scene: SceneId) -> Result<UnloadOutcome> {
        let mut state = self.lock()?;
        let Some(record) = state.scenes.get(&scene) else {
            return Ok(UnloadOutcome::NotLoaded);
        };
        if state.scenes.len() == 1 {
            return Ok(UnloadOutcome::KeptLastScene);
        }
        if !record.retained && state.regular_count() == 1 {
            return Ok(UnloadOutcome::KeptLastScene);
        }
        state.remove_scene(scene);
        Ok(UnloadOutcome::Unloaded)
    }

    /// Unloads every scene except `keep` and retained scenes. Used by
    /// non-additive loads once the new scene is in place.
    pub fn replace_with(&self, keep: SceneId) -> Result<Vec<SceneRef>> {
        let mut state = self.lock()?;
        if !state.scenes.contains_key(&keep) {
            return Err(SceneSwitchError::msg(format!("{keep} is not loaded")));
        }
        let doomed: Vec<SceneRef> = state
            .scenes
            .iter()
            .filter(|(id, record)| **id != keep && !record.retained)
            .map(|(id, record)| SceneRef {
                id: *id,
                name: record.name.clone(),
            })
            .collect();
        for scene in &doomed {
            state.remove_scene(scene.id);
        }
        Ok(doomed)
    }

    pub fn active_scene(&self) -> Result<Option<SceneRef>> {
        let state = self.lock()?;
        Ok(state.active.and_then(|id| state.scene_ref(id)))
    }

    /// Makes `scene` the active scene. A staged scene may become active
    /// ahead of its integration.
    pub fn set_active(&self, scene: SceneId) -> Result<()> {
        let mut state = self.lock()?;
        if !state.scenes.contains_key(&scene) {
            return Err(SceneSwitchError::msg(format!("{scene} is not loaded")));
        }
        state.active = Some(scene);
        Ok(())
    }

    /// Routes new spawns to `scene` instead of the active scene. `None`
    /// restores the default.
    pub fn redirect_spawns(&self, scene: Option<SceneId>) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(id) = scene {
            if !state.scenes.contains_key(&id) {
                return Err(SceneSwitchError::msg(format!("{id} is not loaded")));
            }
        }
        state.spawn_redirect = scene;
        Ok(())
    }

    pub fn spawn_redirect(&self) -> Result<Option<SceneId>> {
        Ok(self.lock()?.spawn_redirect)
    }

    /// Scene that receives newly spawned root objects.
    pub fn spawn_target(&self) -> Result<Option<SceneId>> {
        Ok(self.lock()?.spawn_target())
    }

    /// Spawns a root object into the current spawn target.
    pub fn spawn(&self, name: &str, local: Transform) -> Result<ObjectId> {
        let mut state = self.lock()?;
        let scene = state
            .spawn_target()
            .ok_or_else(|| SceneSwitchError::msg("no scene is available to spawn into"))?;
        Ok(state.insert_object(name, Some(scene), None, local))
    }

    /// Spawns an object under `parent`, inheriting the parent's owner.
    pub fn spawn_child(&self, parent: ObjectId, name: &str, local: Transform) -> Result<ObjectId> {
        let mut state = self.lock()?;
        let owner = state
            .objects
            .get(&parent)
            .map(|object| object.scene)
            .ok_or_else(|| SceneSwitchError::msg(format!("{parent} does not exist")))?;
        Ok(state.insert_object(name, owner, Some(parent), local))
    }

    /// Spawns an object that belongs to no scene and survives every unload.
    pub fn spawn_persistent(&self, name: &str) -> Result<ObjectId> {
        let mut state = self.lock()?;
        Ok(state.insert_object(name, None, None, Transform::IDENTITY))
    }

    /// Destroys an object and its descendants. Returns whether it existed.
    pub fn destroy(&self, object: ObjectId) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.objects.contains_key(&object) {
            return Ok(false);
        }
        for id in state.subtree(object) {
            state.objects.remove(&id);
        }
        Ok(true)
    }

    pub fn object(&self, object: ObjectId) -> Result<Option<ObjectInfo>> {
        Ok(self.lock()?.objects.get(&object).cloned())
    }

    pub fn find_object(&self, name: &str) -> Result<Option<ObjectInfo>> {
        Ok(self
            .lock()?
            .objects
            .values()
            .find(|object| object.name == name)
            .cloned())
    }

    /// Root objects of `scene`, in creation order.
    pub fn roots(&self, scene: SceneId) -> Result<Vec<ObjectId>> {
        let state = self.lock()?;
        Ok(state
            .objects
            .values()
            .filter(|object| object.scene == Some(scene) && object.parent.is_none())
            .map(|object| object.id)
            .collect())
    }

    pub fn objects_in(&self, scene: SceneId) -> Result<Vec<ObjectInfo>> {
        let state = self.lock()?;
        Ok(state
            .objects
            .values()
            .filter(|object| object.scene == Some(scene))
            .cloned()
            .collect())
    }

    /// Creates a root object directly in `scene`, bypassing the spawn target.
    pub fn create_root(&self, scene: SceneId, name: &str, local: Transform) -> Result<ObjectId> {
        let mut state = self.lock()?;
        if !state.scenes.contains_key(&scene) {
            return Err(SceneSwitchError::msg(format!("{scene} is not loaded")));
        }
        Ok(state.insert_object(name, Some(scene), None, local))
    }

    /// Moves `object` (and its subtree) under `parent`. The local transform is
    /// kept as-is.
    pub fn reparent(&self, object: ObjectId, parent: ObjectId) -> Result<()> {
        let mut state = self.lock()?;
        let owner = state
            .objects
            .get(&parent)
            .map(|p| p.scene)
            .ok_or_else(|| SceneSwitchError::msg(format!("{parent} does not exist")))?;
        if !state.objects.contains_key(&object) {
            return Err(SceneSwitchError::msg(format!("{object} does not exist")));
        }
        let subtree = state.subtree(object);
        if subtree.contains(&parent) {
            return Err(SceneSwitchError::msg(format!(
                "cannot parent {object} under its own descendant {parent}"
            )));
        }
        for id in subtree {
            if let Some(entry) = state.objects.get_mut(&id) {
                entry.scene = owner;
            }
        }
        if let Some(entry) = state.objects.get_mut(&object) {
            entry.parent = Some(parent);
        }
        Ok(())
    }

    /// Returns whether `object` lives in `scene`'s hierarchy.
    pub fn is_in_scene(&self, object: ObjectId, scene: SceneId) -> Result<bool> {
        Ok(self
            .lock()?
            .objects
            .get(&object)
            .map(|o| o.scene == Some(scene))
            .unwrap_or(false))
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let state = self.state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = state.lock();
            panic!("scene world poisoned on purpose");
        })
        .join();
    }

    fn lock(&self) -> Result<MutexGuard<'_, WorldState>> {
        self.state
            .lock()
            .map_err(|_| SceneSwitchError::msg("scene world has been poisoned"))
    }
}

impl std::fmt::Debug for SceneWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state.lock() {
            Ok(state) => f
                .debug_struct("SceneWorld")
                .field("scenes", &state.scenes.len())
                .field("objects", &state.objects.len())
                .field("active", &state.active)
                .finish(),
            Err(_) => f.debug_struct("SceneWorld").finish_non_exhaustive(),
        }
    }
}

impl WorldState {
    fn insert_scene(&mut self, name: &str, phase: ScenePhase, scope: Option<&str>) -> SceneRef {
        self.next_scene += 1;
        let id = SceneId(self.next_scene);
        self.scenes.insert(
            id,
            SceneRecord {
                name: name.to_string(),
                phase,
                retained: false,
                scope: scope.map(str::to_string),
            },
        );
        SceneRef {
            id,
            name: name.to_string(),
        }
    }

    fn insert_object(
        &mut self,
        name: &str,
        scene: Option<SceneId>,
        parent: Option<ObjectId>,
        local: Transform,
    ) -> ObjectId {
        self.next_object += 1;
        let id = ObjectId(self.next_object);
        self.objects.insert(
            id,
            ObjectInfo {
                id,
                name: name.to_string(),
                scene,
                parent,
                local,
            },
        );
        id
    }

    fn insert_tree(&mut self, scene: SceneId, parent: Option<ObjectId>, blueprint: &ObjectBlueprint) {
        let id = self.insert_object(&blueprint.name, Some(scene), parent, blueprint.transform);
        for child in &blueprint.children {
            self.insert_tree(scene, Some(id), child);
        }
    }

    fn remove_scene(&mut self, scene: SceneId) {
        self.scenes.remove(&scene);
        self.objects.retain(|_, object| object.scene != Some(scene));
        if self.spawn_redirect == Some(scene) {
            self.spawn_redirect = None;
        }
        if self.active == Some(scene) {
            self.active = self.fallback_active();
        }
    }

    fn regular_count(&self) -> usize {
        self.scenes.values().filter(|record| !record.retained).count()
    }

    // Prefer a regular integrated scene over retained helpers.
    fn fallback_active(&self) -> Option<SceneId> {
        let integrated = |record: &&SceneRecord| record.phase == ScenePhase::Integrated;
        self.scenes
            .iter()
            .find(|(_, record)| integrated(record) && !record.retained)
            .or_else(|| self.scenes.iter().find(|(_, record)| integrated(record)))
            .map(|(id, _)| *id)
    }

    fn spawn_target(&self) -> Option<SceneId> {
        self.spawn_redirect
            .filter(|id| self.scenes.contains_key(id))
            .or(self.active)
    }

    fn scene_ref(&self, id: SceneId) -> Option<SceneRef> {
        self.scenes.get(&id).map(|record| SceneRef {
            id,
            name: record.name.clone(),
        })
    }

    fn scene_refs(&self) -> Vec<SceneRef> {
        self.scenes
            .iter()
            .map(|(id, record)| SceneRef {
                id: *id,
                name: record.name.clone(),
            })
            .collect()
    }

    fn subtree(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut out = vec![root];
        let mut cursor = 0;
        while cursor < out.len() {
            let current = out[cursor];
            out.extend(
                self.objects
                    .values()
                    .filter(|object| object.parent == Some(current))
                    .map(|object| object.id),
            );
            cursor += 1;
        }
        out
    }
}
