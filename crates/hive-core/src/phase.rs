//! The ordered phases of a simulation step.

use std::fmt;

/// One stage of the per-tick pipeline.
///
/// Phases run strictly in declaration order. `Sense`, `Control` and
/// `Act` visit every enabled controllable entity; `Physics` steps the
/// engines and resolves transfers; `Media` updates every medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Sensors recompute their readings against the frozen world view.
    Sense,
    /// Controllers read sensors and write actuator targets.
    Control,
    /// Actuators push their targets into physics and media.
    Act,
    /// Physics engines step and exchange entities.
    Physics,
    /// Media rebuild their state.
    Media,
}

impl Phase {
    /// The phases that run user controller code, in execution order.
    pub const CONTROLLER: [Phase; 3] = [Phase::Sense, Phase::Control, Phase::Act];

    /// Whether this phase dispatches controllable entities.
    pub fn is_controller_phase(self) -> bool {
        matches!(self, Phase::Sense | Phase::Control | Phase::Act)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Sense => "sense",
            Phase::Control => "control",
            Phase::Act => "act",
            Phase::Physics => "physics",
            Phase::Media => "media",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_phases_are_ordered() {
        assert!(Phase::Sense < Phase::Control);
        assert!(Phase::Control < Phase::Act);
        assert!(Phase::Act < Phase::Physics);
        assert!(Phase::Physics < Phase::Media);
        assert!(Phase::CONTROLLER.iter().all(|p| p.is_controller_phase()));
        assert!(!Phase::Media.is_controller_phase());
    }
}
