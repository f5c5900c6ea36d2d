//! Reusable engine, medium and loop-function fixtures.
//!
//! - [`KinematicEngine`] integrates commanded velocities and flags bodies
//!   that leave its volume. It can be told to stop accepting bodies.
//! - [`NullEngine`] owns bodies but never moves them.
//! - [`FailingEngine`] fails deterministically after N updates.
//! - [`LedMedium`] indexes lit LEDs in its own grid.
//! - [`CountingLoopFunctions`] counts hook calls and spawns robots on cue.

use std::sync::Arc;

use hive_core::{EntityKey, MediumError, PhysicsError, Pose, TickId, Vector3};
use hive_engine::{
    ConfigError, EngineVolume, EntityHandle, LoopContext, LoopFunctions, Medium, MediumConfig,
    MediumContext, PhysicsClock, PhysicsEngine, StepError,
};
use hive_space::{SpaceHash, DEFAULT_BUCKET_COUNT};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::ScriptedRobot;

// ── KinematicEngine ────────────────────────────────────────────────

/// Moves each body by its commanded velocity, in `iterations` sub-steps.
pub struct KinematicEngine {
    id: String,
    volume: Option<EngineVolume>,
    clock: PhysicsClock,
    bodies: IndexMap<EntityKey, EntityHandle>,
    departing: Vec<EntityKey>,
    pub updates: u64,
    /// When `false`, `add_entity` refuses every body.
    pub accepting: bool,
}

impl KinematicEngine {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            volume: None,
            clock: PhysicsClock::default(),
            bodies: IndexMap::new(),
            departing: Vec::new(),
            updates: 0,
            accepting: true,
        }
    }

    pub fn with_volume(mut self, volume: EngineVolume) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn clock(&self) -> &PhysicsClock {
        &self.clock
    }

    pub fn keys(&self) -> Vec<EntityKey> {
        self.bodies.keys().copied().collect()
    }
}

impl PhysicsEngine for KinematicEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn init(&mut self, clock: &PhysicsClock) -> Result<(), ConfigError> {
        self.clock = *clock;
        Ok(())
    }

    fn volume(&self) -> Option<&EngineVolume> {
        self.volume.as_ref()
    }

    fn add_entity(&mut self, key: EntityKey, entity: EntityHandle) -> bool {
        if !self.accepting {
            return false;
        }
        self.bodies.insert(key, entity);
        true
    }

    fn remove_entity(&mut self, key: EntityKey) -> Option<EntityHandle> {
        self.departing.retain(|k| *k != key);
        self.bodies.shift_remove(&key)
    }

    fn owns(&self, key: EntityKey) -> bool {
        self.bodies.contains_key(&key)
    }

    fn num_entities(&self) -> usize {
        self.bodies.len()
    }

    fn update(&mut self, dt: f64) -> Result<(), PhysicsError> {
        self.updates += 1;
        let iterations = self.clock.iterations.max(1);
        let step = dt / f64::from(iterations);
        for (key, handle) in &self.bodies {
            let mut entity = handle.lock();
            let id = entity.id().to_owned();
            let Some(body) = entity.as_embodied_mut() else {
                continue;
            };
            if !body.is_movable() {
                continue;
            }
            let mut position = body.position();
            let velocity = body.velocity();
            for _ in 0..iterations {
                position += velocity * step;
            }
            if !position.iter().all(|c| c.is_finite()) {
                return Err(PhysicsError::NonFinite { entity: id });
            }
            body.move_to(Pose {
                position,
                orientation: body.orientation(),
            });
            if self.volume.as_ref().is_some_and(|v| !v.contains(&position)) {
                self.departing.push(*key);
            }
        }
        Ok(())
    }

    fn is_entity_transfer_needed(&self) -> bool {
        !self.departing.is_empty()
    }

    fn take_transfers(&mut self) -> Vec<EntityKey> {
        std::mem::take(&mut self.departing)
    }

    fn reset(&mut self) {
        self.departing.clear();
        self.updates = 0;
    }
}

// ── NullEngine ─────────────────────────────────────────────────────

/// Owns bodies without moving them. Refuses everything when `closed`.
pub struct NullEngine {
    id: String,
    volume: Option<EngineVolume>,
    bodies: Vec<(EntityKey, EntityHandle)>,
    pub closed: bool,
    pub destroyed: bool,
}

impl NullEngine {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            volume: None,
            bodies: Vec::new(),
            closed: false,
            destroyed: false,
        }
    }

    pub fn with_volume(mut self, volume: EngineVolume) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }
}

impl PhysicsEngine for NullEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn volume(&self) -> Option<&EngineVolume> {
        self.volume.as_ref()
    }

    fn add_entity(&mut self, key: EntityKey, entity: EntityHandle) -> bool {
        if self.closed {
            return false;
        }
        self.bodies.push((key, entity));
        true
    }

    fn remove_entity(&mut self, key: EntityKey) -> Option<EntityHandle> {
        let i = self.bodies.iter().position(|(k, _)| *k == key)?;
        Some(self.bodies.remove(i).1)
    }

    fn owns(&self, key: EntityKey) -> bool {
        self.bodies.iter().any(|(k, _)| *k == key)
    }

    fn num_entities(&self) -> usize {
        self.bodies.len()
    }

    fn update(&mut self, _dt: f64) -> Result<(), PhysicsError> {
        Ok(())
    }

    fn is_entity_transfer_needed(&self) -> bool {
        false
    }

    fn take_transfers(&mut self) -> Vec<EntityKey> {
        Vec::new()
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.bodies.clear();
    }
}

// ── FailingEngine ──────────────────────────────────────────────────

/// Succeeds `succeed_count` times, then fails on every update.
pub struct FailingEngine {
    id: String,
    succeed_count: u64,
    calls: u64,
}

impl FailingEngine {
    pub fn new(id: impl Into<String>, succeed_count: u64) -> Self {
        Self {
            id: id.into(),
            succeed_count,
            calls: 0,
        }
    }
}

impl PhysicsEngine for FailingEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn add_entity(&mut self, _key: EntityKey, _entity: EntityHandle) -> bool {
        false
    }

    fn remove_entity(&mut self, _key: EntityKey) -> Option<EntityHandle> {
        None
    }

    fn owns(&self, _key: EntityKey) -> bool {
        false
    }

    fn num_entities(&self) -> usize {
        0
    }

    fn update(&mut self, _dt: f64) -> Result<(), PhysicsError> {
        self.calls += 1;
        if self.calls > self.succeed_count {
            return Err(PhysicsError::UpdateFailed {
                reason: format!("update {} refused", self.calls),
            });
        }
        Ok(())
    }

    fn is_entity_transfer_needed(&self) -> bool {
        false
    }

    fn take_transfers(&mut self) -> Vec<EntityKey> {
        Vec::new()
    }
}

// ── LedMedium ──────────────────────────────────────────────────────

/// Indexes lit members in a private grid, rebuilt every update.
pub struct LedMedium {
    grid: SpaceHash<EntityKey>,
    positions: IndexMap<EntityKey, Vector3<f64>>,
    pub updates: u64,
    pub last_tick: Option<TickId>,
}

impl LedMedium {
    pub fn new() -> Self {
        Self {
            grid: SpaceHash::with_buckets(Vector3::repeat(1.0), DEFAULT_BUCKET_COUNT)
                .expect("unit cells are valid"),
            positions: IndexMap::new(),
            updates: 0,
            last_tick: None,
        }
    }

    /// Lit LEDs within `radius` of `center`, in key order.
    pub fn visible_from(&self, center: &Vector3<f64>, radius: f64) -> Vec<EntityKey> {
        let mut found = Vec::new();
        self.grid.for_each_near(center, radius, |key| {
            let near = self
                .positions
                .get(key)
                .is_some_and(|p| (p - center).norm() <= radius);
            if near {
                found.push(*key);
            }
        });
        found.sort_unstable();
        found.dedup();
        found
    }

    pub fn indexed(&self) -> usize {
        self.grid.len()
    }

    /// Position `key` was indexed at in the last update.
    pub fn position_of(&self, key: EntityKey) -> Option<Vector3<f64>> {
        self.positions.get(&key).copied()
    }
}

impl Default for LedMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl Medium for LedMedium {
    fn id(&self) -> &str {
        crate::Led::MEDIUM
    }

    fn init(&mut self, config: &MediumConfig) -> Result<(), ConfigError> {
        self.grid = SpaceHash::with_buckets(config.cell_size, config.buckets)?;
        Ok(())
    }

    fn update(&mut self, ctx: &MediumContext<'_>) -> Result<(), MediumError> {
        self.grid.clear();
        self.positions.clear();
        for key in ctx.members() {
            let Some(handle) = ctx.registry().get(*key) else {
                continue;
            };
            let entity = handle.lock();
            if !entity.is_enabled() {
                continue;
            }
            let Some(p) = entity.as_positioned() else {
                continue;
            };
            let position = p.position();
            let cell = self.grid.space_to_cell(&position);
            self.grid.insert(cell, *key);
            self.positions.insert(*key, position);
        }
        self.updates += 1;
        self.last_tick = Some(ctx.tick());
        Ok(())
    }

    fn reset(&mut self) {
        self.grid.clear();
        self.positions.clear();
        self.updates = 0;
        self.last_tick = None;
    }
}

// ── CountingLoopFunctions ──────────────────────────────────────────

/// Hook counters shared with the test after the loop functions have been
/// moved into a simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub inits: u32,
    pub pre_steps: u64,
    pub post_steps: u64,
    pub resets: u32,
    pub post_experiments: u32,
    pub destroyed: bool,
    /// Ticks seen by `post_step`, i.e. after the clock advanced.
    pub post_ticks: Vec<TickId>,
    pub spawned: Vec<EntityKey>,
}

/// Counts hook calls, optionally ends the experiment and spawns robots.
#[derive(Default)]
pub struct CountingLoopFunctions {
    stats: Arc<Mutex<LoopStats>>,
    finish_at: Option<TickId>,
    spawns: Vec<(TickId, ScriptedRobot)>,
}

impl CountingLoopFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the experiment finished once the clock reaches `tick`.
    pub fn finishing_at(mut self, tick: TickId) -> Self {
        self.finish_at = Some(tick);
        self
    }

    /// Add `robot` in the `pre_step` of `tick`.
    pub fn spawning(mut self, tick: TickId, robot: ScriptedRobot) -> Self {
        self.spawns.push((tick, robot));
        self
    }

    pub fn stats(&self) -> Arc<Mutex<LoopStats>> {
        Arc::clone(&self.stats)
    }
}

impl LoopFunctions for CountingLoopFunctions {
    fn init(&mut self, _ctx: &mut LoopContext<'_>) -> Result<(), ConfigError> {
        self.stats.lock().inits += 1;
        Ok(())
    }

    fn pre_step(&mut self, ctx: &mut LoopContext<'_>) -> Result<(), StepError> {
        self.stats.lock().pre_steps += 1;
        let tick = ctx.tick();
        let mut i = 0;
        while i < self.spawns.len() {
            if self.spawns[i].0 == tick {
                let (_, robot) = self.spawns.remove(i);
                let key = ctx.add_entity(robot)?;
                self.stats.lock().spawned.push(key);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    fn post_step(&mut self, ctx: &mut LoopContext<'_>) -> Result<(), StepError> {
        let mut stats = self.stats.lock();
        stats.post_steps += 1;
        stats.post_ticks.push(ctx.tick());
        Ok(())
    }

    fn reset(&mut self, _ctx: &mut LoopContext<'_>) {
        self.stats.lock().resets += 1;
    }

    fn is_experiment_finished(&self, _registry: &hive_engine::EntityRegistry, tick: TickId) -> bool {
        self.finish_at.is_some_and(|t| tick >= t)
    }

    fn post_experiment(&mut self, _ctx: &mut LoopContext<'_>) {
        self.stats.lock().post_experiments += 1;
    }

    fn destroy(&mut self) {
        self.stats.lock().destroyed = true;
    }
}
