use crate::{
    world::{ObjectId, SceneRef, SceneWorld, Transform, UnloadOutcome},
    CancellationToken, Result, SceneSwitchError,
};

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of quarantined root objects moved into the destination.
    pub moved: usize,
    /// Root in the destination that now parents the moved objects.
    pub container: Option<ObjectId>,
    pub scratch_unloaded: bool,
}

/// Catches objects spawned while no scene should own them.
///
/// While prepared, the world's spawn target points at a retained scratch
/// scene; [`flush_to`](Self::flush_to) later hands everything caught there to
/// the destination.
#[derive(Debug)]
pub struct SpillQuarantine {
    world: SceneWorld,
    scratch: Option<SceneRef>,
}

impl SpillQuarantine {
    pub fn new(world: SceneWorld) -> Self {
        Self {
            world,
            scratch: None,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.scratch.is_some()
    }

    pub fn scratch(&self) -> Option<&SceneRef> {
        self.scratch.as_ref()
    }

    /// Reserves the scratch scene and redirects spawns into it. Preparing
    /// twice returns the existing scratch scene.
    pub fn prepare(&mut self, name: &str) -> Result<SceneRef> {
        if let Some(scratch) = &self.scratch {
            return Ok(scratch.clone());
        }
        let scratch = match self.world.find_scene(name)? {
            Some(existing) => existing,
            None => self.world.create_empty_scene(name, true)?,
        };
        self.world.set_retained(scratch.id, true)?;
        self.world.redirect_spawns(Some(scratch.id))?;
        tracing::debug!(scratch = %scratch, "quarantine prepared");
        self.scratch = Some(scratch.clone());
        Ok(scratch)
    }

    /// Moves every quarantined object under a fresh root in `destination`.
    ///
    /// Root objects keep their local transforms and the container has an
    /// identity transform, so nothing moves visually. Does nothing when the
    /// quarantine was never prepared.
    pub async fn flush_to(
        &mut self,
        destination: &SceneRef,
        unload_scratch: bool,
        token: &CancellationToken,
    ) -> Result<FlushReport> {
        let Some(scratch) = self.scratch.clone() else {
            return Ok(FlushReport::default());
        };
        token.check()?;
        if !self.world.is_loaded(destination.id)? {
            return Err(SceneSwitchError::msg(format!(
                "quarantine destination {destination} is not loaded"
            )));
        }

        // Stop catching before moving so nothing lands in scratch afterwards.
        self.world.redirect_spawns(None)?;
        let mut report = FlushReport::default();
        if self.world.is_loaded(scratch.id)? {
            let roots = self.world.roots(scratch.id)?;
            if !roots.is_empty() {
                let container =
                    self.world
                        .create_root(destination.id, &scratch.name, Transform::IDENTITY)?;
                for root in &roots {
                    self.world.reparent(*root, container)?;
                }
                report.moved = roots.len();
                report.container = Some(container);
            }
            if unload_scratch {
                report.scratch_unloaded =
                    self.world.unload_scene(scratch.id)? == UnloadOutcome::Unloaded;
            }
        }
        self.scratch = None;
        tracing::debug!(
            scratch = %scratch,
            destination = %destination,
            moved = report.moved,
            "quarantine flushed"
        );
        Ok(report)
    }

    /// Stops redirecting spawns without moving anything.
    pub fn abandon(&mut self) -> Result<()> {
        if self.scratch.take().is_some() {
            self.world.redirect_spawns(None)?;
        }
        Ok(())
    }
}
