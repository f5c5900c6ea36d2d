//! Per-step timing metrics.
//!
//! [`StepMetrics`] captures where the time of one [`Simulation::step`]
//! went, so experiments can tell controller cost from physics cost.
//!
//! [`Simulation::step`]: crate::Simulation::step

/// Timing collected during a single step.
///
/// All durations are in microseconds. The simulation fills these fields
/// after each successful `step()`; a failed step leaves the previous
/// values in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step.
    pub total_us: u64,
    /// Rebuilding the world view and spatial indices.
    pub view_us: u64,
    /// Sense phase across all workers.
    pub sense_us: u64,
    /// Control phase across all workers.
    pub control_us: u64,
    /// Act phase across all workers.
    pub act_us: u64,
    /// All physics engines plus transfers.
    pub physics_us: u64,
    /// Per-engine update times: `(engine id, microseconds)`.
    pub engine_us: Vec<(String, u64)>,
    /// All media.
    pub media_us: u64,
    /// Entities that changed physics engine this step.
    pub transfers: usize,
    /// Controllable entities the scheduler was given.
    pub controllables: usize,
}
