//! Errors raised by user-supplied components.
//!
//! Controllers, physics engines and media are implemented outside the
//! scheduler. When one of them fails it returns one of these errors; the
//! engine wraps it with the failing component's identity and aborts the
//! step. None of them are retried.

use thiserror::Error;

/// Failure raised by controller code during Sense, Control or Act.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ControllerError {
    /// The controller gave up on this step.
    #[error("controller failed: {reason}")]
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A sensor could not produce a reading.
    #[error("sensor '{sensor}' failed: {reason}")]
    Sensor {
        /// Name of the failing sensor.
        sensor: String,
        /// Human-readable description of the failure.
        reason: String,
    },
    /// An actuator rejected its target.
    #[error("actuator '{actuator}' failed: {reason}")]
    Actuator {
        /// Name of the failing actuator.
        actuator: String,
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl ControllerError {
    /// Shorthand for [`ControllerError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Failure raised by a physics engine while stepping.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PhysicsError {
    /// The engine could not advance its state.
    #[error("physics update failed: {reason}")]
    UpdateFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// Engine state contains NaN or infinite values.
    #[error("non-finite state for entity {entity}")]
    NonFinite {
        /// Display form of the offending entity key.
        entity: String,
    },
}

/// Failure raised by a medium while updating.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MediumError {
    /// The medium could not rebuild its state.
    #[error("medium update failed: {reason}")]
    UpdateFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}
