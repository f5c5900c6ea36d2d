//! Simulation configuration, validation, and error types.
//!
//! [`SimulationConfig`] carries the numeric knobs of a run. It is
//! validated once by [`SimulationBuilder::build`](crate::SimulationBuilder::build)
//! before anything is constructed; everything that can go wrong while
//! assembling a simulation is reported as a [`ConfigError`].

use hive_core::Vector3;
use hive_space::{SpaceError, DEFAULT_BUCKET_COUNT};
use thiserror::Error;

use crate::balance::BalancePolicy;
use crate::physics::TransferError;
use crate::registry::RegistryError;

/// Upper bound on worker threads per scheduler.
pub const MAX_THREADS: usize = 256;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while configuring a simulation.
///
/// All of these are fatal: the run cannot start.
#[derive(Clone, Debug, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A spatial grid was given an invalid geometry.
    #[error("spatial index: {0}")]
    Space(#[from] SpaceError),
    /// Worker thread count is zero or above [`MAX_THREADS`].
    #[error("thread count {requested} is outside 1..={max}")]
    InvalidThreadCount {
        /// The requested count.
        requested: usize,
        /// The largest accepted count.
        max: usize,
    },
    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker thread {index}: {reason}")]
    ThreadSpawnFailed {
        /// Index of the worker that could not be created.
        index: usize,
        /// Error reported by the OS.
        reason: String,
    },
    /// `ticks_per_second` is zero.
    #[error("ticks_per_second must be at least 1")]
    InvalidTickRate,
    /// `physics_iterations` is zero.
    #[error("physics_iterations must be at least 1")]
    InvalidIterations,
    /// `max_ticks` is `Some(0)`.
    #[error("max_ticks must be at least 1 when set")]
    InvalidExperimentLength,
    /// An engine volume is malformed.
    #[error("invalid engine volume: {reason}")]
    InvalidVolume {
        /// Description of the problem.
        reason: String,
    },
    /// Two physics engines share an id.
    #[error("duplicate physics engine id '{id}'")]
    DuplicateEngine {
        /// The repeated id.
        id: String,
    },
    /// Two media share an id.
    #[error("duplicate medium id '{id}'")]
    DuplicateMedium {
        /// The repeated id.
        id: String,
    },
    /// A medium refused its configuration.
    #[error("medium '{id}' failed to initialise: {reason}")]
    MediumInit {
        /// Id of the medium.
        id: String,
        /// Description of the problem.
        reason: String,
    },
    /// An entity present at load time could not be placed in any engine.
    #[error("initial placement: {0}")]
    Placement(#[from] TransferError),
    /// Loop functions populated the registry with a rejected entity.
    #[error("entity registry: {0}")]
    Registry(#[from] RegistryError),
    /// Loop functions refused to initialise.
    #[error("loop functions failed to initialise: {reason}")]
    LoopFunctions {
        /// Description of the problem.
        reason: String,
    },
}

// ── ThreadingConfig ────────────────────────────────────────────────

/// How the controller phases are executed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadingConfig {
    /// Worker threads. `0` selects the sequential scheduler. Default: 0.
    pub threads: usize,
    /// Pin worker *i* to logical core *i*. Default: false.
    pub pin_to_cores: bool,
    /// How controllable entities are split between workers.
    /// Default: [`BalancePolicy::Length`].
    pub balance: BalancePolicy,
}

impl ThreadingConfig {
    /// A threaded configuration with `threads` workers and default
    /// pinning and balancing.
    pub fn threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    /// Whether the sequential scheduler is selected.
    pub fn is_sequential(&self) -> bool {
        self.threads == 0
    }

    /// Check the thread count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads > MAX_THREADS {
            return Err(ConfigError::InvalidThreadCount {
                requested: self.threads,
                max: MAX_THREADS,
            });
        }
        Ok(())
    }
}

// ── MediumConfig ───────────────────────────────────────────────────

/// Settings handed to [`Medium::init`](crate::Medium::init).
#[derive(Clone, Debug, PartialEq)]
pub struct MediumConfig {
    /// Cell size of the medium's own spatial grid. Default: 1 m cubes.
    pub cell_size: Vector3<f64>,
    /// Bucket count of that grid. Default: [`DEFAULT_BUCKET_COUNT`].
    pub buckets: usize,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            cell_size: Vector3::new(1.0, 1.0, 1.0),
            buckets: DEFAULT_BUCKET_COUNT,
        }
    }
}

impl MediumConfig {
    /// A configuration with cubic cells of side `size`.
    pub fn with_cell_size(size: f64) -> Self {
        Self {
            cell_size: Vector3::repeat(size),
            ..Self::default()
        }
    }
}

// ── SimulationConfig ───────────────────────────────────────────────

/// Numeric configuration of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Simulated ticks per simulated second. The tick duration shared by
    /// every physics engine is its reciprocal. Default: 10.
    pub ticks_per_second: u32,
    /// Sub-steps each physics engine performs per tick. Default: 10.
    pub physics_iterations: u32,
    /// Experiment length in ticks. `None` runs until loop functions say
    /// otherwise. Default: `None`.
    pub max_ticks: Option<u64>,
    /// Seed of the simulation RNG. Default: 0.
    pub seed: u64,
    /// Scheduler selection.
    pub threading: ThreadingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 10,
            physics_iterations: 10,
            max_ticks: None,
            seed: 0,
            threading: ThreadingConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Duration of one tick in seconds.
    pub fn tick_duration(&self) -> f64 {
        1.0 / f64::from(self.ticks_per_second.max(1))
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. At least one tick per second.
        if self.ticks_per_second == 0 {
            return Err(ConfigError::InvalidTickRate);
        }
        // 2. Physics must take at least one sub-step.
        if self.physics_iterations == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        // 3. An explicit length must allow at least one tick.
        if self.max_ticks == Some(0) {
            return Err(ConfigError::InvalidExperimentLength);
        }
        // 4. Thread count within bounds.
        self.threading.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert!((config.tick_duration() - 0.1).abs() < 1e-12);
        assert!(config.threading.is_sequential());
        assert_eq!(config.threading.balance, BalancePolicy::Length);
    }

    #[test]
    fn zero_tick_rate_rejected() {
        let config = SimulationConfig {
            ticks_per_second: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTickRate));
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = SimulationConfig {
            physics_iterations: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidIterations));
    }

    #[test]
    fn zero_length_rejected() {
        let config = SimulationConfig {
            max_ticks: Some(0),
            ..SimulationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidExperimentLength));
    }

    #[test]
    fn too_many_threads_rejected() {
        let config = SimulationConfig {
            threading: ThreadingConfig::threads(MAX_THREADS + 1),
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThreadCount {
                requested: MAX_THREADS + 1,
                max: MAX_THREADS,
            })
        );
    }

    #[test]
    fn spawn_failure_names_the_thread() {
        let e = ConfigError::ThreadSpawnFailed {
            index: 3,
            reason: "resource temporarily unavailable".into(),
        };
        assert_eq!(
            e.to_string(),
            "failed to spawn worker thread 3: resource temporarily unavailable"
        );
    }
}
