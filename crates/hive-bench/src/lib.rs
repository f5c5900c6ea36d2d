//! Benchmark profiles for the Hive simulator.
//!
//! - [`scatter`]: deterministic random positions on a square arena
//! - [`swarm_profile`]: a built simulation of kinematic robots
//! - [`arena_halves`]: the same swarm split across two physics engines

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use hive_core::Vector3;
use hive_engine::{
    BalancePolicy, EngineVolume, EntityPoint, Simulation, SimulationConfig, ThreadingConfig,
};
use hive_test_utils::{KinematicEngine, ScriptedRobot};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `n` positions drawn uniformly from `[-half, half]^2` on the floor.
pub fn scatter(n: usize, half: f64, seed: u64) -> Vec<Vector3<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut unit = move || (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
    (0..n)
        .map(|_| Vector3::new((unit() * 2.0 - 1.0) * half, (unit() * 2.0 - 1.0) * half, 0.0))
        .collect()
}

fn robots(n: usize, half: f64, seed: u64) -> Vec<ScriptedRobot> {
    scatter(n, half, seed)
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            // Spread costs so balance-by-quantity has something to do.
            let cost = 1 + i % 5;
            ScriptedRobot::new(format!("fb{i}"), p)
                .with_velocity(Vector3::new(0.05, 0.0, 0.0))
                .with_cost(cost)
        })
        .collect()
}

fn threading(threads: usize, balance: BalancePolicy) -> SimulationConfig {
    SimulationConfig {
        threading: ThreadingConfig {
            threads,
            pin_to_cores: false,
            balance,
        },
        ..SimulationConfig::default()
    }
}

/// `n` robots on a `2 * half` metre arena with one unbounded kinematic
/// engine. Robots are indexed in 0.5 m cells and count neighbours every
/// Sense phase.
pub fn swarm_profile(n: usize, half: f64, threads: usize, balance: BalancePolicy) -> Simulation {
    let mut builder =
        Simulation::builder(threading(threads, balance)).engine(KinematicEngine::new("dyn2d"));
    let registry = builder.registry_mut();
    registry
        .index_type("robot", Vector3::repeat(0.5), EntityPoint)
        .unwrap();
    for robot in robots(n, half, 42) {
        registry.add(robot).unwrap();
    }
    builder.build().unwrap()
}

/// Like [`swarm_profile`], but with a bounded `west` engine for x <= 0
/// ahead of an unbounded `east` one, so robots drifting east are handed
/// over once.
pub fn arena_halves(n: usize, half: f64, threads: usize) -> Simulation {
    let extent = half * 2.0;
    let west = EngineVolume::cuboid(
        Vector3::new(-extent, -extent, -1.0),
        Vector3::new(0.0, extent, 1.0),
    )
    .unwrap();
    let mut builder = Simulation::builder(threading(threads, BalancePolicy::Length))
        .engine(KinematicEngine::new("west").with_volume(west))
        .engine(KinematicEngine::new("east"));
    for robot in robots(n, half, 7) {
        builder.registry_mut().add(robot).unwrap();
    }
    builder.build().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scatter_is_deterministic_and_bounded() {
        let a = scatter(100, 5.0, 1);
        assert_eq!(a, scatter(100, 5.0, 1));
        assert_ne!(a, scatter(100, 5.0, 2));
        assert!(a.iter().all(|p| p.x.abs() <= 5.0 && p.y.abs() <= 5.0 && p.z == 0.0));
    }

    #[test]
    fn profiles_step() {
        let mut sim = swarm_profile(50, 2.0, 2, BalancePolicy::Quantity);
        sim.step().unwrap();
        assert_eq!(sim.last_metrics().controllables, 50);

        let mut sim = arena_halves(50, 2.0, 0);
        sim.step().unwrap();
        assert_eq!(sim.physics().owned_count(), 50);
    }
}
