//! Experiment hooks that run between ticks.
//!
//! Loop functions are the place for experiment logic that is not part of
//! any robot: spawning and removing entities, logging statistics,
//! deciding when an experiment is over. They run on the coordinating
//! thread at tick boundaries, so membership changes they make are seen
//! by the scheduler from the next tick on.

use std::sync::Arc;

use hive_core::{EntityKey, TickId};
use rand_chacha::ChaCha8Rng;

use crate::clock::SimulationClock;
use crate::config::ConfigError;
use crate::entity::{handle, Controllable, Entity, EntityHandle, StepContext};
use crate::error::StepError;
use crate::physics::PhysicsEngineSet;
use crate::registry::{EntityRegistry, RegistryError};
use crate::scheduler::{PhaseBatch, Scheduler};

/// User hooks around every step of an experiment.
///
/// All methods have empty defaults.
pub trait LoopFunctions: Send {
    /// Called once after the simulation has been assembled.
    fn init(&mut self, _ctx: &mut LoopContext<'_>) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Called at the start of every step, before the world view is taken.
    fn pre_step(&mut self, _ctx: &mut LoopContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    /// Called at the end of every step, after the clock has advanced.
    fn post_step(&mut self, _ctx: &mut LoopContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    /// Called when the simulation is reset, after entities, engines and
    /// media have been reset.
    fn reset(&mut self, _ctx: &mut LoopContext<'_>) {}

    /// Whether the experiment should stop before `tick`.
    fn is_experiment_finished(&self, _registry: &EntityRegistry, _tick: TickId) -> bool {
        false
    }

    /// Called once when [`Simulation::execute`](crate::Simulation::execute)
    /// finishes.
    fn post_experiment(&mut self, _ctx: &mut LoopContext<'_>) {}

    /// Release resources.
    fn destroy(&mut self) {}
}

/// Loop functions that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLoopFunctions;

impl LoopFunctions for NoLoopFunctions {}

/// Mutable access to the simulation between ticks.
pub struct LoopContext<'a> {
    registry: &'a mut EntityRegistry,
    physics: &'a mut PhysicsEngineSet,
    scheduler: &'a mut dyn Scheduler,
    clock: &'a SimulationClock,
    rng: &'a mut ChaCha8Rng,
}

impl<'a> LoopContext<'a> {
    pub(crate) fn new(
        registry: &'a mut EntityRegistry,
        physics: &'a mut PhysicsEngineSet,
        scheduler: &'a mut dyn Scheduler,
        clock: &'a SimulationClock,
        rng: &'a mut ChaCha8Rng,
    ) -> Self {
        Self {
            registry,
            physics,
            scheduler,
            clock,
            rng,
        }
    }

    /// Current tick.
    pub fn tick(&self) -> TickId {
        self.clock.tick()
    }

    /// The simulation clock.
    pub fn clock(&self) -> &SimulationClock {
        self.clock
    }

    /// The entity registry.
    pub fn registry(&self) -> &EntityRegistry {
        self.registry
    }

    /// The physics engines.
    pub fn physics(&self) -> &PhysicsEngineSet {
        self.physics
    }

    /// The physics engines, mutably.
    pub fn physics_mut(&mut self) -> &mut PhysicsEngineSet {
        self.physics
    }

    /// The seeded simulation RNG.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }

    /// Register a top-level entity and place it in a physics engine if
    /// it is embodied.
    pub fn add_entity<E: Entity>(&mut self, entity: E) -> Result<EntityKey, RegistryError> {
        admit(self.registry, self.physics, handle(entity), None)
    }

    /// Register an entity composed into `parent`.
    pub fn add_child<E: Entity>(
        &mut self,
        parent: EntityKey,
        entity: E,
    ) -> Result<EntityKey, RegistryError> {
        admit(self.registry, self.physics, handle(entity), Some(parent))
    }

    /// Remove an entity and its children from the registry and from
    /// physics.
    pub fn remove_entity(&mut self, key: EntityKey) -> Result<(), RegistryError> {
        evict(self.registry, self.physics, key)
    }

    /// Enable or disable an entity and its children.
    pub fn set_enabled(&mut self, key: EntityKey, enabled: bool) -> Result<(), RegistryError> {
        self.registry.set_enabled(key, enabled)
    }

    /// Run `visit` on every enabled controllable entity, spread over the
    /// scheduler's workers the same way controller phases are.
    ///
    /// Each call sees the most recent world view. Returns once every
    /// entity has been visited.
    pub fn for_each_controllable<F>(&mut self, visit: F) -> Result<(), StepError>
    where
        F: Fn(&StepContext<'_>, &mut dyn Controllable) + Send + Sync + 'static,
    {
        let batch = PhaseBatch {
            entities: self.registry.controllable_snapshot(),
            generation: self.registry.generation(),
            view: self.registry.view(),
        };
        self.scheduler.for_each_controllable(&batch, Arc::new(visit))
    }
}

impl std::fmt::Debug for LoopContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopContext")
            .field("tick", &self.clock.tick())
            .field("entities", &self.registry.len())
            .finish()
    }
}

/// Register `entity` and hand it to physics if it has a body.
///
/// An entity that no engine accepts is removed again, so the registry
/// and the engines never disagree about who exists.
pub(crate) fn admit(
    registry: &mut EntityRegistry,
    physics: &mut PhysicsEngineSet,
    entity: EntityHandle,
    parent: Option<EntityKey>,
) -> Result<EntityKey, RegistryError> {
    let embodied = entity.lock().as_embodied().is_some();
    let key = registry.insert(entity.clone(), parent)?;
    if embodied {
        if let Err(e) = physics.assign(key, entity) {
            registry.remove(key)?;
            return Err(e.into());
        }
    }
    Ok(key)
}

/// Remove `key` and its children from the registry and release every
/// removed body from physics.
pub(crate) fn evict(
    registry: &mut EntityRegistry,
    physics: &mut PhysicsEngineSet,
    key: EntityKey,
) -> Result<(), RegistryError> {
    for (removed, _) in registry.remove(key)? {
        physics.release(removed);
    }
    Ok(())
}
