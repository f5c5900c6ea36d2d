//! Errors that abort a simulation step.

use hive_core::{ControllerError, MediumError, Phase, PhysicsError};
use thiserror::Error;

use crate::physics::TransferError;
use crate::registry::RegistryError;

/// Why [`Simulation::step`](crate::Simulation::step) failed.
///
/// A failed step does not advance the clock. Nothing is retried: a
/// failing controller or engine means the experiment itself is broken.
#[derive(Clone, Debug, PartialEq, Error)]
#[non_exhaustive]
pub enum StepError {
    /// User controller code failed during Sense, Control or Act.
    #[error("{phase} failed for entity '{entity}': {source}")]
    Controller {
        /// Id of the failing entity.
        entity: String,
        /// Phase in which it failed.
        phase: Phase,
        /// What the controller reported.
        source: ControllerError,
    },
    /// Controller code panicked on a worker thread.
    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked {
        /// Index of the worker.
        worker: usize,
        /// Panic payload, if it was a string.
        message: String,
    },
    /// A worker thread is no longer accepting work.
    #[error("worker {worker} is no longer running")]
    WorkerLost {
        /// Index of the worker.
        worker: usize,
    },
    /// Every worker has gone away.
    #[error("worker pool disconnected")]
    PoolDisconnected,
    /// A physics engine failed to step.
    #[error("physics engine '{engine}' failed: {source}")]
    Physics {
        /// Id of the engine.
        engine: String,
        /// What the engine reported.
        source: PhysicsError,
    },
    /// Entity ownership was violated while transferring between engines.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// A medium failed to update.
    #[error("medium '{medium}' failed: {source}")]
    Medium {
        /// Id of the medium.
        medium: String,
        /// What the medium reported.
        source: MediumError,
    },
    /// Loop functions changed membership in a way the registry rejected.
    #[error("entity registry: {0}")]
    Registry(#[from] RegistryError),
    /// Loop functions reported a failure of their own.
    #[error("loop functions failed: {reason}")]
    LoopFunctions {
        /// Description of the problem.
        reason: String,
    },
}
