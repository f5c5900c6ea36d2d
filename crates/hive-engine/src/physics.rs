//! Physics engines and the ordered set that coordinates them.
//!
//! Each engine owns a disjoint partition of the embodied entities and
//! steps it with the shared tick duration. After every engine has
//! stepped, engines that flagged "transfer needed" hand their departing
//! entities back to the set, which re-homes each one in the engine whose
//! domain now contains it.
//!
//! Ownership is tracked twice: inside each engine (its partition) and in
//! the set's owner table. Transfers run under `&mut PhysicsEngineSet`, so
//! nothing can observe the owner table while an entity is between
//! engines.

use std::any::Any;
use std::time::Instant;

use hive_core::{EntityKey, PhysicsError, Vector2, Vector3};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::entity::EntityHandle;
use crate::error::StepError;

// ── TransferError ──────────────────────────────────────────────────

/// Ownership violations while placing or moving embodied entities.
#[derive(Clone, Debug, PartialEq, Error)]
#[non_exhaustive]
pub enum TransferError {
    /// An engine asked to transfer an entity it does not own.
    #[error("engine '{engine}' cannot transfer {entity}: it does not own it")]
    NotOwned {
        /// Id of the engine that made the request.
        engine: String,
        /// The entity in question.
        entity: EntityKey,
    },
    /// No engine contains the entity's position and accepts it.
    #[error(
        "no physics engine accepts {entity} at ({:.3}, {:.3}, {:.3})",
        .position.x, .position.y, .position.z
    )]
    NoDestination {
        /// The entity that could not be placed.
        entity: EntityKey,
        /// Where it was.
        position: Vector3<f64>,
    },
    /// The entity has no physical body.
    #[error("{entity} is not embodied")]
    NotEmbodied {
        /// The entity in question.
        entity: EntityKey,
    },
    /// A transfer failed and the source engine refused to take the entity
    /// back. The entity is no longer owned by any engine.
    #[error("engine '{engine}' refused to take back {entity}; it has no owner")]
    RollbackFailed {
        /// The entity left without an owner.
        entity: EntityKey,
        /// Id of the engine that released it.
        engine: String,
    },
    /// The entity already belongs to an engine.
    #[error("{entity} is already owned by engine '{engine}'")]
    AlreadyOwned {
        /// The entity in question.
        entity: EntityKey,
        /// Id of the current owner.
        engine: String,
    },
}

// ── PhysicsClock ───────────────────────────────────────────────────

/// Timing shared by every engine in a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicsClock {
    /// Seconds simulated per tick.
    pub tick_duration: f64,
    /// Sub-steps per tick.
    pub iterations: u32,
}

impl PhysicsClock {
    /// Seconds simulated per sub-step.
    pub fn iteration_duration(&self) -> f64 {
        self.tick_duration / f64::from(self.iterations.max(1))
    }
}

impl Default for PhysicsClock {
    fn default() -> Self {
        Self {
            tick_duration: 0.1,
            iterations: 10,
        }
    }
}

// ── EngineVolume ───────────────────────────────────────────────────

/// The region of space an engine is responsible for.
///
/// A point is inside when it lies between the optional bottom and top
/// heights (inclusive) and inside the side polygon, if one is given. The
/// polygon is the XY footprint of a prism and may be concave.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineVolume {
    bottom: Option<f64>,
    top: Option<f64>,
    sides: Vec<Vector2<f64>>,
}

impl EngineVolume {
    /// A volume containing every point.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a volume.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidVolume`] if a height is not finite, the
    /// bottom is above the top, or the side polygon has fewer than three
    /// vertices.
    pub fn new(
        bottom: Option<f64>,
        top: Option<f64>,
        sides: Vec<Vector2<f64>>,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidVolume { reason };
        for h in [bottom, top].into_iter().flatten() {
            if !h.is_finite() {
                return Err(invalid(format!("height {h} is not finite")));
            }
        }
        if let (Some(b), Some(t)) = (bottom, top) {
            if b > t {
                return Err(invalid(format!("bottom {b} is above top {t}")));
            }
        }
        if !sides.is_empty() && sides.len() < 3 {
            return Err(invalid(format!(
                "side polygon needs at least 3 vertices, got {}",
                sides.len()
            )));
        }
        if sides.iter().any(|v| !v.x.is_finite() || !v.y.is_finite()) {
            return Err(invalid("side polygon has a non-finite vertex".into()));
        }
        Ok(Self { bottom, top, sides })
    }

    /// An axis-aligned box volume.
    pub fn cuboid(min: Vector3<f64>, max: Vector3<f64>) -> Result<Self, ConfigError> {
        let lo = min.inf(&max);
        let hi = min.sup(&max);
        Self::new(
            Some(lo.z),
            Some(hi.z),
            vec![
                Vector2::new(lo.x, lo.y),
                Vector2::new(hi.x, lo.y),
                Vector2::new(hi.x, hi.y),
                Vector2::new(lo.x, hi.y),
            ],
        )
    }

    /// Whether `point` lies inside the volume.
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        if self.bottom.is_some_and(|b| point.z < b) || self.top.is_some_and(|t| point.z > t) {
            return false;
        }
        self.sides.is_empty() || self.footprint_contains(point.x, point.y)
    }

    /// Crossing-number test against the side polygon.
    fn footprint_contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        let n = self.sides.len();
        for i in 0..n {
            let a = self.sides[i];
            let b = self.sides[(i + 1) % n];
            if (a.y > y) != (b.y > y) {
                let cross_x = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
                if x < cross_x {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

// ── PhysicsEngine ──────────────────────────────────────────────────

/// A steppable physics engine.
///
/// Engines are opaque to the scheduler. The set only needs them to step,
/// to accept and release entities, and to say which of their entities
/// have left their domain.
pub trait PhysicsEngine: Any + Send + 'static {
    /// Unique engine id.
    fn id(&self) -> &str;

    /// Receive the shared clock before the first step.
    fn init(&mut self, _clock: &PhysicsClock) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Region the engine is responsible for. `None` means everywhere.
    fn volume(&self) -> Option<&EngineVolume> {
        None
    }

    /// Whether `point` lies in the engine's domain.
    fn contains_point(&self, point: &Vector3<f64>) -> bool {
        self.volume().is_none_or(|v| v.contains(point))
    }

    /// Take ownership of an entity. Returns `false` if the engine cannot
    /// simulate it.
    fn add_entity(&mut self, key: EntityKey, entity: EntityHandle) -> bool;

    /// Give up ownership of an entity.
    fn remove_entity(&mut self, key: EntityKey) -> Option<EntityHandle>;

    /// Whether the engine currently owns `key`.
    fn owns(&self, key: EntityKey) -> bool;

    /// Number of entities owned.
    fn num_entities(&self) -> usize;

    /// Advance by one tick of `dt` seconds.
    fn update(&mut self, dt: f64) -> Result<(), PhysicsError>;

    /// Whether the last update left entities outside the engine's domain.
    fn is_entity_transfer_needed(&self) -> bool;

    /// Entities scheduled for transfer. Clears the engine's transfer list.
    fn take_transfers(&mut self) -> Vec<EntityKey>;

    /// Return to the state after [`init`](Self::init), keeping ownership.
    fn reset(&mut self) {}

    /// Release resources at experiment end.
    fn destroy(&mut self) {}
}

impl dyn PhysicsEngine {
    /// Attempt to downcast to a concrete engine type.
    pub fn downcast_ref<T: PhysicsEngine>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Attempt to downcast to a concrete engine type, mutably.
    pub fn downcast_mut<T: PhysicsEngine>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut::<T>()
    }
}

fn position_of(entity: &EntityHandle) -> Option<Vector3<f64>> {
    entity.lock().as_embodied().map(|body| body.position())
}

// ── PhysicsEngineSet ───────────────────────────────────────────────

/// Outcome of one physics phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhysicsReport {
    /// Wall-clock time per engine update, in microseconds, in engine order.
    pub engine_us: Vec<(String, u64)>,
    /// Entities that changed engine.
    pub transfers: usize,
}

struct Ownership {
    engine: usize,
    entity: EntityHandle,
}

/// Ordered collection of physics engines plus the authoritative owner
/// table.
pub struct PhysicsEngineSet {
    clock: PhysicsClock,
    engines: Vec<Box<dyn PhysicsEngine>>,
    owners: IndexMap<EntityKey, Ownership>,
}

impl PhysicsEngineSet {
    /// An empty set whose engines will share `clock`.
    pub fn new(clock: PhysicsClock) -> Self {
        Self {
            clock,
            engines: Vec::new(),
            owners: IndexMap::new(),
        }
    }

    /// The shared clock.
    pub fn clock(&self) -> &PhysicsClock {
        &self.clock
    }

    /// Initialise an engine and append it. Update order is insertion
    /// order.
    pub fn add_engine(&mut self, mut engine: Box<dyn PhysicsEngine>) -> Result<(), ConfigError> {
        if self.index_of(engine.id()).is_some() {
            return Err(ConfigError::DuplicateEngine {
                id: engine.id().to_owned(),
            });
        }
        engine.init(&self.clock)?;
        self.engines.push(engine);
        Ok(())
    }

    /// Number of engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether the set has no engines.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Engine ids in update order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.engines.iter().map(|e| e.id())
    }

    /// Look up an engine by id.
    pub fn engine(&self, id: &str) -> Option<&dyn PhysicsEngine> {
        self.index_of(id).map(|i| &*self.engines[i])
    }

    /// Look up an engine by id, mutably.
    pub fn engine_mut(&mut self, id: &str) -> Option<&mut dyn PhysicsEngine> {
        let i = self.index_of(id)?;
        Some(&mut *self.engines[i])
    }

    /// Id of the engine that owns `key`.
    pub fn owner_of(&self, key: EntityKey) -> Option<&str> {
        self.owners.get(&key).map(|o| self.engines[o.engine].id())
    }

    /// Number of embodied entities owned across all engines.
    pub fn owned_count(&self) -> usize {
        self.owners.len()
    }

    /// Give an embodied entity to the first engine whose domain contains
    /// it and that accepts it. Returns the id of that engine.
    pub fn assign(&mut self, key: EntityKey, entity: EntityHandle) -> Result<&str, TransferError> {
        if let Some(o) = self.owners.get(&key) {
            return Err(TransferError::AlreadyOwned {
                entity: key,
                engine: self.engines[o.engine].id().to_owned(),
            });
        }
        let position = position_of(&entity).ok_or(TransferError::NotEmbodied { entity: key })?;
        let index = self
            .place(key, entity, &position)
            .ok_or(TransferError::NoDestination {
                entity: key,
                position,
            })?;
        Ok(self.engines[index].id())
    }

    /// Remove an entity from whichever engine owns it.
    pub fn release(&mut self, key: EntityKey) -> Option<EntityHandle> {
        let owned = self.owners.shift_remove(&key)?;
        self.engines[owned.engine].remove_entity(key);
        Some(owned.entity)
    }

    /// Step every engine in order, then resolve transfers.
    ///
    /// # Errors
    ///
    /// [`StepError::Physics`] when an engine fails to step;
    /// [`StepError::Transfer`] on an ownership violation.
    pub fn update(&mut self) -> Result<PhysicsReport, StepError> {
        let dt = self.clock.tick_duration;
        let mut report = PhysicsReport::default();
        for engine in &mut self.engines {
            let start = Instant::now();
            engine.update(dt).map_err(|source| StepError::Physics {
                engine: engine.id().to_owned(),
                source,
            })?;
            report
                .engine_us
                .push((engine.id().to_owned(), start.elapsed().as_micros() as u64));
        }
        for source in 0..self.engines.len() {
            if self.engines[source].is_entity_transfer_needed() {
                report.transfers += self.transfer_entities(source)?;
            }
        }
        Ok(report)
    }

    /// Move every entity engine `source` has scheduled for transfer.
    ///
    /// Each entity is released by the source and accepted by the first
    /// engine, in update order, whose domain contains it. If nobody
    /// accepts it, it goes back to the source and
    /// [`TransferError::NoDestination`] is returned. If the source refuses
    /// it too, the entity is left unowned and
    /// [`TransferError::RollbackFailed`] is returned instead. Returns how
    /// many entities changed engine.
    pub fn transfer_entities(&mut self, source: usize) -> Result<usize, TransferError> {
        let keys = self.engines[source].take_transfers();
        let mut moved = 0;
        for key in keys {
            if self.move_entity(source, key)? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Re-home every owned entity whose owner no longer contains it.
    ///
    /// Used after a reset has put entities back at their start poses.
    pub fn rehome(&mut self) -> Result<usize, TransferError> {
        let stray: Vec<(EntityKey, usize)> = self
            .owners
            .iter()
            .filter(|(_, o)| {
                let engine = &self.engines[o.engine];
                !position_of(&o.entity).is_some_and(|p| engine.contains_point(&p))
            })
            .map(|(key, o)| (*key, o.engine))
            .collect();
        let mut moved = 0;
        for (key, owner) in stray {
            if self.move_entity(owner, key)? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Reset every engine.
    pub fn reset(&mut self) {
        for engine in &mut self.engines {
            engine.reset();
        }
    }

    /// Destroy every engine and forget all ownership.
    pub fn destroy(&mut self) {
        for engine in &mut self.engines {
            engine.destroy();
        }
        self.owners.clear();
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.engines.iter().position(|e| e.id() == id)
    }

    fn not_owned(&self, source: usize, key: EntityKey) -> TransferError {
        TransferError::NotOwned {
            engine: self.engines[source].id().to_owned(),
            entity: key,
        }
    }

    /// Offer `entity` to every engine containing `position`; record and
    /// return the one that accepts.
    fn place(&mut self, key: EntityKey, entity: EntityHandle, position: &Vector3<f64>) -> Option<usize> {
        for (i, engine) in self.engines.iter_mut().enumerate() {
            if engine.contains_point(position) && engine.add_entity(key, entity.clone()) {
                self.owners.insert(key, Ownership { engine: i, entity });
                return Some(i);
            }
        }
        None
    }

    /// Release `key` from `source` and place it again. Returns whether it
    /// ended up in a different engine.
    fn move_entity(&mut self, source: usize, key: EntityKey) -> Result<bool, TransferError> {
        if self.owners.get(&key).map(|o| o.engine) != Some(source) {
            return Err(self.not_owned(source, key));
        }
        if self.engines[source].remove_entity(key).is_none() {
            return Err(self.not_owned(source, key));
        }
        let Some(Ownership { entity, .. }) = self.owners.shift_remove(&key) else {
            return Err(self.not_owned(source, key));
        };

        let Some(position) = position_of(&entity) else {
            self.restore(source, key, entity)?;
            return Err(TransferError::NotEmbodied { entity: key });
        };
        match self.place(key, entity.clone(), &position) {
            Some(dest) if dest != source => {
                debug!(
                    entity = %key,
                    from = self.engines[source].id(),
                    to = self.engines[dest].id(),
                    "entity transferred"
                );
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                self.restore(source, key, entity)?;
                Err(TransferError::NoDestination {
                    entity: key,
                    position,
                })
            }
        }
    }

    fn restore(
        &mut self,
        source: usize,
        key: EntityKey,
        entity: EntityHandle,
    ) -> Result<(), TransferError> {
        if self.engines[source].add_entity(key, entity.clone()) {
            self.owners.insert(key, Ownership { engine: source, entity });
            return Ok(());
        }
        let engine = self.engines[source].id().to_owned();
        warn!(entity = %key, %engine, "engine refused to take back an entity it released");
        Err(TransferError::RollbackFailed { entity: key, engine })
    }
}

impl std::fmt::Debug for PhysicsEngineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsEngineSet")
            .field("clock", &self.clock)
            .field("engines", &self.engines.iter().map(|e| e.id()).collect::<Vec<_>>())
            .field("owned", &self.owners.len())
            .finish()
    }
}
