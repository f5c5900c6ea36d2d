//! The simulation clock.

use hive_core::TickId;

/// Tick counter plus the fixed simulated duration of a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationClock {
    tick: TickId,
    tick_duration: f64,
}

impl SimulationClock {
    /// A clock at tick 0 advancing `tick_duration` seconds per tick.
    pub fn new(tick_duration: f64) -> Self {
        Self {
            tick: TickId::default(),
            tick_duration,
        }
    }

    /// Current tick.
    pub fn tick(&self) -> TickId {
        self.tick
    }

    /// Simulated seconds per tick.
    pub fn tick_duration(&self) -> f64 {
        self.tick_duration
    }

    /// Simulated seconds since tick 0.
    pub fn elapsed_seconds(&self) -> f64 {
        self.tick.0 as f64 * self.tick_duration
    }

    /// Move to the next tick.
    pub fn advance(&mut self) -> TickId {
        self.tick = self.tick.next();
        self.tick
    }

    /// Back to tick 0.
    pub fn reset(&mut self) {
        self.tick = TickId::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_and_resets() {
        let mut clock = SimulationClock::new(0.1);
        assert_eq!(clock.tick(), TickId(0));
        clock.advance();
        assert_eq!(clock.advance(), TickId(2));
        assert!((clock.elapsed_seconds() - 0.2).abs() < 1e-12);
        clock.reset();
        assert_eq!(clock.tick(), TickId(0));
        assert_eq!(clock.tick_duration(), 0.1);
    }
}
