//! The simulation context: one object that owns a whole experiment.
//!
//! [`Simulation`] is assembled by a [`SimulationBuilder`] and then driven
//! with [`step()`](Simulation::step) or [`execute()`](Simulation::execute).
//! Each step runs the pipeline
//!
//! ```text
//!   pre_step ─► view ─► Sense ─► Control ─► Act ─► Physics ─► Media ─► clock+1 ─► post_step
//! ```
//!
//! Sense, Control and Act go through the configured [`Scheduler`]; every
//! other stage runs on the calling thread while the workers are idle.
//!
//! # Ownership model
//!
//! `Simulation` is [`Send`] but not [`Sync`]. Every mutating method takes
//! `&mut self`, so membership can only change between steps. There is no
//! process-wide simulator instance: two simulations in one process are
//! fully independent.

use std::time::Instant;

use hive_core::{EntityKey, Phase, TickId};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace};

use crate::clock::SimulationClock;
use crate::config::{ConfigError, MediumConfig, SimulationConfig};
use crate::entity::{handle, Entity};
use crate::error::StepError;
use crate::loop_functions::{admit, evict, LoopContext, LoopFunctions, NoLoopFunctions};
use crate::medium::{Medium, MediumSet};
use crate::metrics::StepMetrics;
use crate::physics::{PhysicsClock, PhysicsEngine, PhysicsEngineSet};
use crate::pool::PoolShutdownReport;
use crate::registry::{EntityRegistry, RegistryError};
use crate::scheduler::{scheduler_for, PhaseBatch, Scheduler};

// Compile-time assertion: Simulation is Send.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<Simulation>();
    }
};

// ── SimulationBuilder ──────────────────────────────────────────────

/// Collects the parts of a simulation before it starts.
///
/// Entities added to the builder's registry are placed in physics
/// engines by [`build()`](Self::build).
pub struct SimulationBuilder {
    config: SimulationConfig,
    medium_config: MediumConfig,
    registry: EntityRegistry,
    engines: Vec<Box<dyn PhysicsEngine>>,
    media: Vec<Box<dyn Medium>>,
    loop_functions: Box<dyn LoopFunctions>,
}

impl SimulationBuilder {
    /// A builder with an empty registry and no engines or media.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            medium_config: MediumConfig::default(),
            registry: EntityRegistry::new(),
            engines: Vec::new(),
            media: Vec::new(),
            loop_functions: Box::new(NoLoopFunctions),
        }
    }

    /// Replace the registry.
    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The registry being assembled.
    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    /// Append a physics engine. Engines update in the order added.
    pub fn engine(mut self, engine: impl PhysicsEngine) -> Self {
        self.engines.push(Box::new(engine));
        self
    }

    /// Append a medium. Media update in the order added.
    pub fn medium(mut self, medium: impl Medium) -> Self {
        self.media.push(Box::new(medium));
        self
    }

    /// Settings passed to every medium's `init`.
    pub fn medium_config(mut self, config: MediumConfig) -> Self {
        self.medium_config = config;
        self
    }

    /// Install experiment hooks.
    pub fn loop_functions(mut self, loop_functions: impl LoopFunctions + 'static) -> Self {
        self.loop_functions = Box::new(loop_functions);
        self
    }

    /// Validate the configuration and assemble the simulation.
    ///
    /// Order: configuration check, engines, media, placement of every
    /// embodied entity, scheduler, loop functions, first world view.
    pub fn build(self) -> Result<Simulation, ConfigError> {
        let Self {
            config,
            medium_config,
            mut registry,
            engines,
            media,
            mut loop_functions,
        } = self;
        config.validate()?;

        let mut physics = PhysicsEngineSet::new(PhysicsClock {
            tick_duration: config.tick_duration(),
            iterations: config.physics_iterations,
        });
        for engine in engines {
            physics.add_engine(engine)?;
        }

        let mut medium_set = MediumSet::new();
        for medium in media {
            medium_set.add(medium)?;
        }
        medium_set.init_all(&medium_config)?;

        for (key, entity) in registry.embodied() {
            physics.assign(key, entity)?;
        }

        let mut scheduler = scheduler_for(&config.threading)?;
        let clock = SimulationClock::new(config.tick_duration());
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        loop_functions.init(&mut LoopContext::new(
            &mut registry,
            &mut physics,
            &mut *scheduler,
            &clock,
            &mut rng,
        ))?;
        registry.refresh_view(clock.tick());

        info!(
            entities = registry.len(),
            controllables = registry.controllables().len(),
            engines = physics.len(),
            media = medium_set.len(),
            threads = scheduler.num_threads(),
            seed = config.seed,
            "simulation ready"
        );

        Ok(Simulation {
            config,
            registry,
            physics,
            media: medium_set,
            scheduler,
            loop_functions,
            clock,
            rng,
            last_metrics: StepMetrics::default(),
            destroyed: false,
        })
    }
}

impl std::fmt::Debug for SimulationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("engines", &self.engines.len())
            .field("media", &self.media.len())
            .finish()
    }
}

// ── Simulation ─────────────────────────────────────────────────────

/// A running experiment.
pub struct Simulation {
    config: SimulationConfig,
    registry: EntityRegistry,
    physics: PhysicsEngineSet,
    media: MediumSet,
    scheduler: Box<dyn Scheduler>,
    loop_functions: Box<dyn LoopFunctions>,
    clock: SimulationClock,
    rng: ChaCha8Rng,
    last_metrics: StepMetrics,
    destroyed: bool,
}

impl Simulation {
    /// Start assembling a simulation.
    pub fn builder(config: SimulationConfig) -> SimulationBuilder {
        SimulationBuilder::new(config)
    }

    // ── Stepping ────────────────────────────────────────────────

    /// Run one tick.
    ///
    /// # Errors
    ///
    /// Any [`StepError`] aborts the step. The clock only advances once
    /// physics and media have completed, so a failed step leaves
    /// [`current_tick()`](Self::current_tick) unchanged.
    pub fn step(&mut self) -> Result<&StepMetrics, StepError> {
        let start = Instant::now();
        let tick = self.clock.tick();
        let mut metrics = StepMetrics::default();

        self.loop_functions.pre_step(&mut LoopContext::new(
            &mut self.registry,
            &mut self.physics,
            &mut *self.scheduler,
            &self.clock,
            &mut self.rng,
        ))?;

        let t = Instant::now();
        self.registry.refresh_view(tick);
        metrics.view_us = t.elapsed().as_micros() as u64;

        {
            let batch = PhaseBatch {
                entities: self.registry.controllable_snapshot(),
                generation: self.registry.generation(),
                view: self.registry.view(),
            };
            metrics.controllables = batch.entities.len();
            for phase in Phase::CONTROLLER {
                trace!(%tick, %phase, "phase start");
                let t = Instant::now();
                self.scheduler.run_phase(phase, &batch)?;
                let us = t.elapsed().as_micros() as u64;
                match phase {
                    Phase::Sense => metrics.sense_us = us,
                    Phase::Control => metrics.control_us = us,
                    _ => metrics.act_us = us,
                }
            }
        }

        trace!(%tick, phase = %Phase::Physics, "phase start");
        let t = Instant::now();
        let report = self.physics.update()?;
        metrics.physics_us = t.elapsed().as_micros() as u64;
        metrics.engine_us = report.engine_us;
        metrics.transfers = report.transfers;

        trace!(%tick, phase = %Phase::Media, "phase start");
        let t = Instant::now();
        self.media.update(&self.registry, tick)?;
        metrics.media_us = t.elapsed().as_micros() as u64;

        self.clock.advance();
        self.loop_functions.post_step(&mut LoopContext::new(
            &mut self.registry,
            &mut self.physics,
            &mut *self.scheduler,
            &self.clock,
            &mut self.rng,
        ))?;

        metrics.total_us = start.elapsed().as_micros() as u64;
        debug!(
            %tick,
            total_us = metrics.total_us,
            transfers = metrics.transfers,
            "step complete"
        );
        self.last_metrics = metrics;
        Ok(&self.last_metrics)
    }

    /// Whether the experiment is over: the configured length has been
    /// reached or the loop functions say so.
    pub fn is_experiment_finished(&self) -> bool {
        let tick = self.clock.tick();
        self.config.max_ticks.is_some_and(|max| tick.0 >= max)
            || self.loop_functions.is_experiment_finished(&self.registry, tick)
    }

    /// Step until [`is_experiment_finished()`](Self::is_experiment_finished),
    /// then run the `post_experiment` hook. Returns the number of steps run.
    ///
    /// Without `max_ticks` this only returns once the loop functions end
    /// the experiment or a step fails.
    pub fn execute(&mut self) -> Result<u64, StepError> {
        let mut steps = 0;
        while !self.is_experiment_finished() {
            self.step()?;
            steps += 1;
        }
        self.loop_functions.post_experiment(&mut LoopContext::new(
            &mut self.registry,
            &mut self.physics,
            &mut *self.scheduler,
            &self.clock,
            &mut self.rng,
        ));
        info!(steps, tick = %self.clock.tick(), "experiment finished");
        Ok(steps)
    }

    /// Return to tick 0.
    ///
    /// Entities, engines, media and loop functions are reset, bodies are
    /// re-homed to the engine containing their start pose, the RNG is
    /// reseeded and the world view is rebuilt.
    ///
    /// # Errors
    ///
    /// [`StepError::Transfer`] when a body cannot be re-homed. Entities
    /// and engines have been reset by then, but the clock, media, RNG,
    /// loop functions and metrics are left as they were.
    pub fn reset(&mut self) -> Result<(), StepError> {
        self.registry.reset();
        self.physics.reset();
        let moved = self.physics.rehome()?;
        self.clock.reset();
        self.media.reset();
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.loop_functions.reset(&mut LoopContext::new(
            &mut self.registry,
            &mut self.physics,
            &mut *self.scheduler,
            &self.clock,
            &mut self.rng,
        ));
        self.registry.refresh_view(self.clock.tick());
        self.last_metrics = StepMetrics::default();
        info!(rehomed = moved, "simulation reset");
        Ok(())
    }

    // ── Membership ──────────────────────────────────────────────

    /// Add a top-level entity. Embodied entities are placed in a physics
    /// engine immediately. The scheduler sees the entity from the next
    /// step on.
    pub fn add_entity<E: Entity>(&mut self, entity: E) -> Result<EntityKey, RegistryError> {
        admit(&mut self.registry, &mut self.physics, handle(entity), None)
    }

    /// Add an entity composed into `parent`.
    pub fn add_child<E: Entity>(
        &mut self,
        parent: EntityKey,
        entity: E,
    ) -> Result<EntityKey, RegistryError> {
        admit(&mut self.registry, &mut self.physics, handle(entity), Some(parent))
    }

    /// Remove an entity and its children.
    pub fn remove_entity(&mut self, key: EntityKey) -> Result<(), RegistryError> {
        evict(&mut self.registry, &mut self.physics, key)
    }

    /// Enable or disable an entity and its children.
    pub fn set_enabled(&mut self, key: EntityKey, enabled: bool) -> Result<(), RegistryError> {
        self.registry.set_enabled(key, enabled)
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Worker threads used by the scheduler. `0` when sequential.
    pub fn num_threads(&self) -> usize {
        self.scheduler.num_threads()
    }

    /// The tick the next step will compute.
    pub fn current_tick(&self) -> TickId {
        self.clock.tick()
    }

    /// The simulation clock.
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The configuration the simulation was built with.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The entity registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// The physics engines.
    pub fn physics(&self) -> &PhysicsEngineSet {
        &self.physics
    }

    /// The physics engines, mutably.
    pub fn physics_mut(&mut self) -> &mut PhysicsEngineSet {
        &mut self.physics
    }

    /// The media.
    pub fn media(&self) -> &MediumSet {
        &self.media
    }

    /// The media, mutably.
    pub fn media_mut(&mut self) -> &mut MediumSet {
        &mut self.media
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.scheduler
    }

    /// The seeded simulation RNG.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Metrics of the last successful step.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }

    // ── Teardown ────────────────────────────────────────────────

    /// Destroy loop functions, media, engines and entities, then stop the
    /// worker threads.
    ///
    /// Idempotent. Also run on drop.
    pub fn destroy(&mut self) -> Option<PoolShutdownReport> {
        if self.destroyed {
            return None;
        }
        self.destroyed = true;
        self.loop_functions.destroy();
        self.media.destroy();
        self.physics.destroy();
        self.registry.destroy();
        let report = self.scheduler.shutdown();
        info!(?report, "simulation destroyed");
        report
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.clock.tick())
            .field("threads", &self.scheduler.num_threads())
            .field("registry", &self.registry)
            .field("physics", &self.physics)
            .field("media", &self.media)
            .finish()
    }
}
