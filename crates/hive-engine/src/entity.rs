//! The capability-based entity contract.
//!
//! An entity is anything the registry manages. Instead of a class
//! hierarchy, an entity advertises what it can do through the `as_*`
//! accessors on [`Entity`]: a robot body answers [`Entity::as_embodied`],
//! a robot with a controller answers [`Entity::as_controllable_mut`], a
//! light answers [`Entity::as_positioned`], and so on. The scheduler,
//! the physics engine set and the spatial indices each ask only for the
//! capability they need.
//!
//! Entities live behind an [`EntityHandle`]. Worker threads lock only the
//! handles of the entities assigned to them, so the locks are never
//! contended within a phase.

use std::sync::Arc;

use hive_core::{Bounded, ControllerError, EntityKey, Pose, Positioned, TickId, Vector3};
use parking_lot::Mutex;

use crate::view::WorldView;

/// Shared, lockable handle to a registered entity.
pub type EntityHandle = Arc<Mutex<dyn Entity>>;

/// Wrap an entity in a fresh [`EntityHandle`].
pub fn handle<E: Entity>(entity: E) -> EntityHandle {
    Arc::new(Mutex::new(entity))
}

/// Anything managed by the entity registry.
pub trait Entity: Send + 'static {
    /// Identifier, unique among entities of the same type.
    fn id(&self) -> &str;

    /// Type name used for grouping and spatial indexing.
    fn type_name(&self) -> &str;

    /// Whether the scheduler should drive this entity.
    ///
    /// Disabled entities are skipped in Sense, Control and Act but stay
    /// in physics and medium bookkeeping.
    fn is_enabled(&self) -> bool;

    /// Enable or disable the entity.
    fn set_enabled(&mut self, enabled: bool);

    /// Name of the medium this entity participates in, if any.
    fn medium(&self) -> Option<&str> {
        None
    }

    /// Return to the state the entity had when it was added.
    fn reset(&mut self) {}

    /// Release resources before the entity is dropped.
    fn destroy(&mut self) {}

    /// Position capability.
    fn as_positioned(&self) -> Option<&dyn Positioned> {
        None
    }

    /// Volume capability.
    fn as_bounded(&self) -> Option<&dyn Bounded> {
        None
    }

    /// Physical body capability.
    fn as_embodied(&self) -> Option<&dyn Embodied> {
        None
    }

    /// Mutable physical body capability.
    fn as_embodied_mut(&mut self) -> Option<&mut dyn Embodied> {
        None
    }

    /// Controller capability.
    fn as_controllable(&self) -> Option<&dyn Controllable> {
        None
    }

    /// Mutable controller capability.
    fn as_controllable_mut(&mut self) -> Option<&mut dyn Controllable> {
        None
    }
}

/// A body owned by exactly one physics engine.
pub trait Embodied: Positioned {
    /// Place the body at `pose`. Called by physics engines.
    fn move_to(&mut self, pose: Pose);

    /// Linear velocity the body is currently commanding.
    fn velocity(&self) -> Vector3<f64> {
        Vector3::zeros()
    }

    /// Whether physics may move the body at all.
    fn is_movable(&self) -> bool {
        true
    }
}

/// An entity driven through Sense, Control and Act every tick.
///
/// Each method only touches state owned by the entity itself (its
/// sensors, controller and actuators). Anything about the rest of the
/// world is read from the [`StepContext`].
pub trait Controllable {
    /// Recompute sensor readings.
    fn sense(&mut self, ctx: &StepContext<'_>) -> Result<(), ControllerError>;

    /// Run the control logic: read sensors, write actuator targets.
    fn control_step(&mut self, ctx: &StepContext<'_>) -> Result<(), ControllerError>;

    /// Push actuator targets into the body.
    fn act(&mut self, ctx: &StepContext<'_>) -> Result<(), ControllerError>;

    /// Relative amount of work this entity costs per phase.
    ///
    /// Used by balance-by-quantity. A sensor count is a good estimate.
    fn cost(&self) -> usize {
        1
    }
}

/// What a controllable entity sees during one phase.
#[derive(Clone, Copy, Debug)]
pub struct StepContext<'a> {
    key: EntityKey,
    view: &'a WorldView,
}

impl<'a> StepContext<'a> {
    /// Context for the entity `key` against `view`.
    pub fn new(key: EntityKey, view: &'a WorldView) -> Self {
        Self { key, view }
    }

    /// Key of the entity being driven.
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// Tick being computed.
    pub fn tick(&self) -> TickId {
        self.view.tick()
    }

    /// The frozen world snapshot for this tick.
    pub fn view(&self) -> &'a WorldView {
        self.view
    }
}
