//! Simulation engine for Hive multi-robot experiments.
//!
//! Owns entities in an [`EntityRegistry`], steps them through Sense,
//! Control and Act with a [`SequentialScheduler`] or a
//! [`ThreadedScheduler`] backed by a [`WorkerPool`], then advances the
//! [`PhysicsEngineSet`] and [`MediumSet`]. [`Simulation`] ties the parts
//! together.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod balance;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod loop_functions;
pub mod medium;
pub mod metrics;
pub mod physics;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod simulation;
pub mod view;

pub use balance::{partition_by_cost, partition_by_length, BalancePolicy};
pub use clock::SimulationClock;
pub use config::{ConfigError, MediumConfig, SimulationConfig, ThreadingConfig, MAX_THREADS};
pub use entity::{handle, Controllable, Embodied, Entity, EntityHandle, StepContext};
pub use error::StepError;
pub use loop_functions::{LoopContext, LoopFunctions, NoLoopFunctions};
pub use medium::{Medium, MediumContext, MediumSet};
pub use metrics::StepMetrics;
pub use physics::{
    EngineVolume, PhysicsClock, PhysicsEngine, PhysicsEngineSet, PhysicsReport, TransferError,
};
pub use pool::{PoolShutdownReport, Task, WorkerExit, WorkerPool};
pub use registry::{enabled_only, EntityExtent, EntityPoint, EntityRegistry, RegistryError};
pub use scheduler::{
    run_controllers, scheduler_for, visit_controllables, ControllableVisitor, PhaseBatch,
    Scheduler, SequentialScheduler, ThreadedScheduler,
};
pub use simulation::{Simulation, SimulationBuilder};
pub use view::WorldView;
