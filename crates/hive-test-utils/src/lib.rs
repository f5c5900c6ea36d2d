//! Test utilities and mock types for Hive development.
//!
//! Provides scripted entities ([`ScriptedRobot`], [`Led`]), a shared
//! [`PhaseLog`] that records which entity ran which phase on which
//! thread, and the engine, medium and loop-function fixtures in
//! [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Once};

use hive_core::{Aabb, Bounded, ControllerError, Phase, Pose, Positioned, TickId, Vector3};
use hive_engine::{Controllable, Embodied, Entity, StepContext};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

pub use fixtures::{
    CountingLoopFunctions, FailingEngine, KinematicEngine, LedMedium, LoopStats, NullEngine,
};

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber for tests and benches.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Safe to call
/// from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

// ── PhaseLog ───────────────────────────────────────────────────────

/// One controller callback observed by a [`PhaseLog`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseEvent {
    pub tick: TickId,
    pub phase: Phase,
    pub entity: String,
    /// Name of the thread the callback ran on.
    pub thread: Option<String>,
}

/// Shared, append-only record of controller callbacks.
#[derive(Clone, Debug, Default)]
pub struct PhaseLog(Arc<Mutex<Vec<PhaseEvent>>>);

impl PhaseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tick: TickId, phase: Phase, entity: &str) {
        self.0.lock().push(PhaseEvent {
            tick,
            phase,
            entity: entity.to_owned(),
            thread: std::thread::current().name().map(str::to_owned),
        });
    }

    pub fn events(&self) -> Vec<PhaseEvent> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    /// Events of one tick, in the order they were recorded.
    pub fn tick(&self, tick: TickId) -> Vec<PhaseEvent> {
        self.0.lock().iter().filter(|e| e.tick == tick).cloned().collect()
    }

    /// Whether, within every tick, all Sense events precede all Control
    /// events, which precede all Act events.
    pub fn phases_are_ordered(&self) -> bool {
        let events = self.0.lock();
        let mut last: Option<(TickId, Phase)> = None;
        for e in events.iter() {
            if let Some((tick, phase)) = last {
                if e.tick == tick && e.phase < phase {
                    return false;
                }
                if e.tick < tick {
                    return false;
                }
            }
            last = Some((e.tick, e.phase));
        }
        true
    }
}

// ── ScriptedRobot ──────────────────────────────────────────────────

/// A controllable, embodied robot with scripted behaviour.
///
/// Sense counts the robots within [`ScriptedRobot::SENSE_RANGE`] in the
/// world view, Control copies the cruise velocity into the target, and
/// Act commits the target as the body's velocity, which a
/// [`KinematicEngine`] then integrates.
pub struct ScriptedRobot {
    id: String,
    start: Pose,
    pose: Pose,
    cruise: Vector3<f64>,
    target: Vector3<f64>,
    velocity: Vector3<f64>,
    enabled: bool,
    cost: usize,
    medium: Option<String>,
    log: Option<PhaseLog>,
    fail_in: Option<(Phase, TickId)>,
    panic_in: Option<Phase>,
    neighbours: Arc<Mutex<usize>>,
}

impl ScriptedRobot {
    /// Radius of the neighbour count taken during Sense.
    pub const SENSE_RANGE: f64 = 1.0;

    pub fn new(id: impl Into<String>, position: Vector3<f64>) -> Self {
        Self {
            id: id.into(),
            start: Pose::at(position),
            pose: Pose::at(position),
            cruise: Vector3::zeros(),
            target: Vector3::zeros(),
            velocity: Vector3::zeros(),
            enabled: true,
            cost: 1,
            medium: None,
            log: None,
            fail_in: None,
            panic_in: None,
            neighbours: Arc::new(Mutex::new(0)),
        }
    }

    /// Velocity commanded every Control phase.
    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.cruise = velocity;
        self
    }

    /// Balance-by-quantity cost, e.g. the number of sensors.
    pub fn with_cost(mut self, cost: usize) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_medium(mut self, medium: impl Into<String>) -> Self {
        self.medium = Some(medium.into());
        self
    }

    pub fn logging(mut self, log: &PhaseLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Fail with a [`ControllerError`] in `phase` of `tick`.
    pub fn failing_in(mut self, phase: Phase, tick: TickId) -> Self {
        self.fail_in = Some((phase, tick));
        self
    }

    /// Panic in `phase` of every tick.
    pub fn panicking_in(mut self, phase: Phase) -> Self {
        self.panic_in = Some(phase);
        self
    }

    /// Handle to the neighbour count written by Sense, readable after the
    /// robot has been moved into a registry.
    pub fn neighbour_counter(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.neighbours)
    }

    fn run(&mut self, phase: Phase, ctx: &StepContext<'_>) -> Result<(), ControllerError> {
        if let Some(log) = &self.log {
            log.record(ctx.tick(), phase, &self.id);
        }
        if self.panic_in == Some(phase) {
            panic!("robot {} panicked in {phase}", self.id);
        }
        if self.fail_in == Some((phase, ctx.tick())) {
            return Err(ControllerError::failed(format!("{} scripted failure", self.id)));
        }
        Ok(())
    }
}

impl Positioned for ScriptedRobot {
    fn position(&self) -> Vector3<f64> {
        self.pose.position
    }

    fn orientation(&self) -> hive_core::UnitQuaternion<f64> {
        self.pose.orientation
    }
}

impl Bounded for ScriptedRobot {
    fn bounding_box(&self) -> Aabb {
        Aabb::around(self.pose.position, Vector3::repeat(0.085))
    }
}

impl Embodied for ScriptedRobot {
    fn move_to(&mut self, pose: Pose) {
        self.pose = pose;
    }

    fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }
}

impl Controllable for ScriptedRobot {
    fn sense(&mut self, ctx: &StepContext<'_>) -> Result<(), ControllerError> {
        self.run(Phase::Sense, ctx)?;
        let near = ctx
            .view()
            .within("robot", &self.pose.position, Self::SENSE_RANGE)
            .into_iter()
            .filter(|k| *k != ctx.key())
            .count();
        *self.neighbours.lock() = near;
        Ok(())
    }

    fn control_step(&mut self, ctx: &StepContext<'_>) -> Result<(), ControllerError> {
        self.run(Phase::Control, ctx)?;
        self.target = self.cruise;
        Ok(())
    }

    fn act(&mut self, ctx: &StepContext<'_>) -> Result<(), ControllerError> {
        self.run(Phase::Act, ctx)?;
        self.velocity = self.target;
        Ok(())
    }

    fn cost(&self) -> usize {
        self.cost
    }
}

impl Entity for ScriptedRobot {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "robot"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn medium(&self) -> Option<&str> {
        self.medium.as_deref()
    }

    fn reset(&mut self) {
        self.pose = self.start;
        self.target = Vector3::zeros();
        self.velocity = Vector3::zeros();
        *self.neighbours.lock() = 0;
    }

    fn as_positioned(&self) -> Option<&dyn Positioned> {
        Some(self)
    }

    fn as_bounded(&self) -> Option<&dyn Bounded> {
        Some(self)
    }

    fn as_embodied(&self) -> Option<&dyn Embodied> {
        Some(self)
    }

    fn as_embodied_mut(&mut self) -> Option<&mut dyn Embodied> {
        Some(self)
    }

    fn as_controllable(&self) -> Option<&dyn Controllable> {
        Some(self)
    }

    fn as_controllable_mut(&mut self) -> Option<&mut dyn Controllable> {
        Some(self)
    }
}

// ── Led ────────────────────────────────────────────────────────────

/// A positioned light that participates in the `leds` medium while lit.
pub struct Led {
    id: String,
    position: Vector3<f64>,
    lit: bool,
}

impl Led {
    pub const MEDIUM: &'static str = "leds";

    pub fn new(id: impl Into<String>, position: Vector3<f64>) -> Self {
        Self {
            id: id.into(),
            position,
            lit: true,
        }
    }
}

impl Positioned for Led {
    fn position(&self) -> Vector3<f64> {
        self.position
    }
}

impl Entity for Led {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "led"
    }

    fn is_enabled(&self) -> bool {
        self.lit
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.lit = enabled;
    }

    fn medium(&self) -> Option<&str> {
        Some(Self::MEDIUM)
    }

    fn as_positioned(&self) -> Option<&dyn Positioned> {
        Some(self)
    }
}
