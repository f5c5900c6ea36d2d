//! Hive: the core of a multi-robot swarm simulator.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Hive sub-crates. For most users, adding `hive` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use hive::prelude::*;
//!
//! // A robot that drives east at 1 m/s.
//! struct Rover {
//!     position: Vector3<f64>,
//!     velocity: Vector3<f64>,
//!     enabled: bool,
//! }
//!
//! impl Positioned for Rover {
//!     fn position(&self) -> Vector3<f64> { self.position }
//! }
//!
//! impl Embodied for Rover {
//!     fn move_to(&mut self, pose: Pose) { self.position = pose.position; }
//!     fn velocity(&self) -> Vector3<f64> { self.velocity }
//! }
//!
//! impl Controllable for Rover {
//!     fn sense(&mut self, _ctx: &StepContext<'_>) -> Result<(), ControllerError> { Ok(()) }
//!     fn control_step(&mut self, _ctx: &StepContext<'_>) -> Result<(), ControllerError> { Ok(()) }
//!     fn act(&mut self, _ctx: &StepContext<'_>) -> Result<(), ControllerError> {
//!         self.velocity = Vector3::new(1.0, 0.0, 0.0);
//!         Ok(())
//!     }
//! }
//!
//! impl Entity for Rover {
//!     fn id(&self) -> &str { "rover-0" }
//!     fn type_name(&self) -> &str { "rover" }
//!     fn is_enabled(&self) -> bool { self.enabled }
//!     fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
//!     fn as_positioned(&self) -> Option<&dyn Positioned> { Some(self) }
//!     fn as_embodied(&self) -> Option<&dyn Embodied> { Some(self) }
//!     fn as_embodied_mut(&mut self) -> Option<&mut dyn Embodied> { Some(self) }
//!     fn as_controllable(&self) -> Option<&dyn Controllable> { Some(self) }
//!     fn as_controllable_mut(&mut self) -> Option<&mut dyn Controllable> { Some(self) }
//! }
//!
//! // A physics engine that integrates velocity over an unbounded floor.
//! #[derive(Default)]
//! struct Floor(Vec<(EntityKey, EntityHandle)>);
//!
//! impl PhysicsEngine for Floor {
//!     fn id(&self) -> &str { "floor" }
//!     fn add_entity(&mut self, key: EntityKey, entity: EntityHandle) -> bool {
//!         self.0.push((key, entity));
//!         true
//!     }
//!     fn remove_entity(&mut self, key: EntityKey) -> Option<EntityHandle> {
//!         let i = self.0.iter().position(|(k, _)| *k == key)?;
//!         Some(self.0.remove(i).1)
//!     }
//!     fn owns(&self, key: EntityKey) -> bool { self.0.iter().any(|(k, _)| *k == key) }
//!     fn num_entities(&self) -> usize { self.0.len() }
//!     fn update(&mut self, dt: f64) -> Result<(), PhysicsError> {
//!         for (_, entity) in &self.0 {
//!             let mut entity = entity.lock();
//!             if let Some(body) = entity.as_embodied_mut() {
//!                 let position = body.position() + body.velocity() * dt;
//!                 body.move_to(Pose::at(position));
//!             }
//!         }
//!         Ok(())
//!     }
//!     fn is_entity_transfer_needed(&self) -> bool { false }
//!     fn take_transfers(&mut self) -> Vec<EntityKey> { Vec::new() }
//! }
//!
//! let config = SimulationConfig {
//!     max_ticks: Some(10),
//!     ..SimulationConfig::default()
//! };
//! let mut builder = Simulation::builder(config).engine(Floor::default());
//! let rover = Rover { position: Vector3::zeros(), velocity: Vector3::zeros(), enabled: true };
//! let key = builder.registry_mut().add(rover).unwrap();
//! let mut sim = builder.build().unwrap();
//!
//! assert_eq!(sim.execute().unwrap(), 10);
//! assert_eq!(sim.current_tick(), TickId(10));
//! assert_eq!(sim.physics().owner_of(key), Some("floor"));
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `hive-core` | Keys, ticks, phases, poses, capability traits, user errors |
//! | [`space`] | `hive-space` | Spatial hash grid and indexing policies |
//! | [`engine`] | `hive-engine` | Registry, physics and media sets, schedulers, simulation |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`hive-core`).
///
/// Contains [`types::EntityKey`], [`types::TickId`], [`types::Phase`],
/// poses and bounding boxes, and the errors user code reports.
pub use hive_core as types;

/// Spatial hash grid and per-type indexing policies (`hive-space`).
///
/// Provides [`space::SpaceHash`] and the [`space::SpaceHashUpdater`]
/// policies that decide which cells an entity occupies.
pub use hive_space as space;

/// The simulation engine (`hive-engine`).
///
/// [`engine::Simulation`] owns a whole experiment; the registry, physics
/// engine set, media and schedulers are available individually.
pub use hive_engine as engine;

/// Common imports for typical Hive usage.
///
/// ```rust
/// use hive::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use hive_core::{
        Aabb, Bounded, EntityKey, Phase, Pose, Positioned, TickId, UnitQuaternion, Vector3,
    };

    // Errors
    pub use hive_core::{ControllerError, MediumError, PhysicsError};
    pub use hive_engine::{ConfigError, RegistryError, StepError, TransferError};

    // Space
    pub use hive_space::{SpaceHash, SpaceHashUpdater};

    // Entities
    pub use hive_engine::{
        handle, Controllable, Embodied, Entity, EntityExtent, EntityHandle, EntityPoint,
        EntityRegistry, StepContext, WorldView,
    };

    // Physics and media
    pub use hive_engine::{EngineVolume, Medium, MediumContext, PhysicsEngine};

    // Simulation
    pub use hive_engine::{
        BalancePolicy, LoopContext, LoopFunctions, Simulation, SimulationConfig, StepMetrics,
        ThreadingConfig,
    };
}
