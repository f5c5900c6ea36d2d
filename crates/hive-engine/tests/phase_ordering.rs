//! Integration test: phase ordering across schedulers.
//!
//! Within every tick, all Sense callbacks must complete before any
//! Control callback starts, and all Control callbacks before any Act,
//! whatever the scheduler and thread count. Disabled robots are never
//! driven, and a failing controller aborts the step without advancing
//! the clock.

use hive_core::{Phase, TickId, Vector3};
use hive_engine::{EntityPoint, Simulation, SimulationConfig, StepError, ThreadingConfig};
use hive_test_utils::{init_tracing, KinematicEngine, NullEngine, PhaseLog, ScriptedRobot};

fn robot(i: usize, log: &PhaseLog) -> ScriptedRobot {
    ScriptedRobot::new(format!("fb{i:02}"), Vector3::new(i as f64 * 0.5, 0.0, 0.0))
        .with_velocity(Vector3::new(0.0, 0.1, 0.0))
        .logging(log)
}

fn swarm(threads: usize, robots: usize, log: &PhaseLog) -> Simulation {
    let config = SimulationConfig {
        threading: ThreadingConfig::threads(threads),
        ..SimulationConfig::default()
    };
    let mut builder = Simulation::builder(config).engine(KinematicEngine::new("dyn2d"));
    let registry = builder.registry_mut();
    registry
        .index_type("robot", Vector3::repeat(1.0), EntityPoint)
        .unwrap();
    for i in 0..robots {
        registry.add(robot(i, log)).unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn phases_never_interleave() {
    init_tracing();
    for threads in [0, 1, 2, 4] {
        let log = PhaseLog::new();
        let mut sim = swarm(threads, 20, &log);
        assert_eq!(sim.num_threads(), threads);
        for _ in 0..3 {
            sim.step().unwrap();
        }
        assert!(log.phases_are_ordered(), "threads = {threads}");
        for t in 0..3 {
            let events = log.tick(TickId(t));
            assert_eq!(events.len(), 20 * 3, "threads = {threads}, tick {t}");
            for phase in Phase::CONTROLLER {
                assert_eq!(events.iter().filter(|e| e.phase == phase).count(), 20);
            }
        }
        assert_eq!(sim.current_tick(), TickId(3));
    }
}

#[test]
fn sequential_runs_on_calling_thread_in_registry_order() {
    let log = PhaseLog::new();
    let mut sim = swarm(0, 3, &log);
    sim.step().unwrap();
    let order: Vec<String> = log
        .events()
        .iter()
        .map(|e| format!("{}:{}", e.phase, e.entity))
        .collect();
    assert_eq!(
        order,
        vec![
            "sense:fb00", "sense:fb01", "sense:fb02",
            "control:fb00", "control:fb01", "control:fb02",
            "act:fb00", "act:fb01", "act:fb02",
        ]
    );
    let here = std::thread::current().name().map(str::to_owned);
    assert!(log.events().iter().all(|e| e.thread == here));
}

#[test]
fn two_robots_five_ticks_with_idle_physics() {
    let log = PhaseLog::new();
    let mut builder =
        Simulation::builder(SimulationConfig::default()).engine(NullEngine::new("idle"));
    for i in 0..2 {
        builder.registry_mut().add(robot(i, &log)).unwrap();
    }
    let mut sim = builder.build().unwrap();
    for _ in 0..5 {
        sim.step().unwrap();
    }
    assert_eq!(sim.current_tick(), TickId(5));
    for id in ["fb00", "fb01"] {
        let phases: Vec<Phase> = log
            .events()
            .iter()
            .filter(|e| e.entity == id)
            .map(|e| e.phase)
            .collect();
        assert_eq!(phases.len(), 15);
        for tick in phases.chunks(3) {
            assert_eq!(tick, Phase::CONTROLLER);
        }
    }
}

#[test]
fn disabled_robot_is_skipped_but_stays_in_physics() {
    let log = PhaseLog::new();
    let mut builder = Simulation::builder(SimulationConfig::default())
        .engine(KinematicEngine::new("dyn2d"));
    let registry = builder.registry_mut();
    let active = registry.add(robot(0, &log)).unwrap();
    let parked = registry.add(robot(1, &log).disabled()).unwrap();
    let mut sim = builder.build().unwrap();

    for _ in 0..2 {
        sim.step().unwrap();
    }
    assert!(log.events().iter().all(|e| e.entity == "fb00"));
    assert_eq!(log.len(), 6);
    assert_eq!(sim.physics().owner_of(parked), Some("dyn2d"));
    assert_eq!(sim.physics().owner_of(active), Some("dyn2d"));

    sim.set_enabled(parked, true).unwrap();
    sim.step().unwrap();
    assert_eq!(log.tick(TickId(2)).len(), 6);
}

#[test]
fn controller_failure_aborts_step() {
    for threads in [0, 2] {
        let log = PhaseLog::new();
        let config = SimulationConfig {
            threading: ThreadingConfig::threads(threads),
            ..SimulationConfig::default()
        };
        let mut builder = Simulation::builder(config).engine(KinematicEngine::new("dyn2d"));
        for i in 0..4 {
            let mut r = robot(i, &log);
            if i == 2 {
                r = r.failing_in(Phase::Control, TickId(1));
            }
            builder.registry_mut().add(r).unwrap();
        }
        let mut sim = builder.build().unwrap();

        sim.step().unwrap();
        let err = sim.step().unwrap_err();
        match err {
            StepError::Controller { entity, phase, .. } => {
                assert_eq!(entity, "fb02");
                assert_eq!(phase, Phase::Control);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(sim.current_tick(), TickId(1), "threads = {threads}");
        assert!(log
            .tick(TickId(1))
            .iter()
            .all(|e| e.phase != Phase::Act));
    }
}

#[test]
fn robots_sense_neighbours_from_frozen_view() {
    let log = PhaseLog::new();
    let mut builder = Simulation::builder(SimulationConfig::default())
        .engine(KinematicEngine::new("dyn2d"));
    let registry = builder.registry_mut();
    registry
        .index_type("robot", Vector3::repeat(1.0), EntityPoint)
        .unwrap();
    // Three robots in a row, 0.5 m apart, and one far away.
    let mut counters = Vec::new();
    for i in 0..3 {
        let r = robot(i, &log);
        counters.push(r.neighbour_counter());
        registry.add(r).unwrap();
    }
    let loner = ScriptedRobot::new("far", Vector3::new(50.0, 50.0, 0.0));
    counters.push(loner.neighbour_counter());
    registry.add(loner).unwrap();
    let mut sim = builder.build().unwrap();

    sim.step().unwrap();
    let counts: Vec<usize> = counters.iter().map(|p| *p.lock()).collect();
    assert_eq!(counts, vec![2, 2, 2, 0]);
    assert_eq!(sim.registry().view().index("robot").unwrap().len(), 4);
}
