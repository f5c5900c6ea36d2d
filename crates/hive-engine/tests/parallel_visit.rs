//! Integration test: loop functions visiting controllables on the pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use hive_core::{EntityKey, TickId, Vector3};
use hive_engine::{
    BalancePolicy, LoopContext, LoopFunctions, Simulation, SimulationConfig, StepError,
    ThreadingConfig,
};
use hive_test_utils::{init_tracing, KinematicEngine, ScriptedRobot};
use parking_lot::Mutex;

#[derive(Clone, Debug)]
struct Visit {
    tick: TickId,
    key: EntityKey,
    cost: usize,
    thread: Option<String>,
}

/// Visits every controllable after each step.
struct Census {
    visits: Arc<Mutex<Vec<Visit>>>,
}

impl LoopFunctions for Census {
    fn post_step(&mut self, ctx: &mut LoopContext<'_>) -> Result<(), StepError> {
        let visits = Arc::clone(&self.visits);
        ctx.for_each_controllable(move |step, c| {
            visits.lock().push(Visit {
                tick: step.tick(),
                key: step.key(),
                cost: c.cost(),
                thread: std::thread::current().name().map(str::to_owned),
            });
        })
    }
}

fn run(threads: usize) -> (Vec<EntityKey>, Vec<Visit>) {
    let config = SimulationConfig {
        threading: ThreadingConfig {
            threads,
            pin_to_cores: false,
            balance: BalancePolicy::Quantity,
        },
        ..SimulationConfig::default()
    };
    let visits = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Simulation::builder(config)
        .engine(KinematicEngine::new("dyn2d"))
        .loop_functions(Census {
            visits: Arc::clone(&visits),
        });
    let mut enabled = Vec::new();
    for i in 0..13 {
        let robot = ScriptedRobot::new(format!("fb{i:02}"), Vector3::new(i as f64, 0.0, 0.0))
            .with_cost(1 + i % 3);
        if i == 6 {
            builder.registry_mut().add(robot.disabled()).unwrap();
        } else {
            enabled.push(builder.registry_mut().add(robot).unwrap());
        }
    }
    let mut sim = builder.build().unwrap();
    for _ in 0..3 {
        sim.step().unwrap();
    }
    sim.destroy();
    let visits = visits.lock().clone();
    (enabled, visits)
}

fn check(threads: usize) {
    init_tracing();
    let (enabled, visits) = run(threads);
    assert_eq!(visits.len(), 3 * enabled.len());
    for tick in 0..3 {
        let mut seen: BTreeMap<EntityKey, usize> = BTreeMap::new();
        for visit in visits.iter().filter(|v| v.tick == TickId(tick)) {
            *seen.entry(visit.key).or_default() += 1;
        }
        assert_eq!(seen.keys().copied().collect::<Vec<_>>(), enabled, "tick {tick}");
        assert!(seen.values().all(|n| *n == 1), "tick {tick}: {seen:?}");
    }
    for (i, key) in enabled.iter().enumerate() {
        let visit = visits.iter().find(|v| v.key == *key).unwrap();
        let index = if i < 6 { i } else { i + 1 };
        assert_eq!(visit.cost, 1 + index % 3);
    }
    let on_workers = visits
        .iter()
        .filter(|v| v.thread.as_deref().is_some_and(|t| t.starts_with("hive-worker-")))
        .count();
    if threads == 0 {
        assert_eq!(on_workers, 0);
    } else {
        assert_eq!(on_workers, visits.len());
    }
}

#[test]
fn sequential_visits_each_enabled_robot_once() {
    check(0);
}

#[test]
fn single_worker_visits_each_enabled_robot_once() {
    check(1);
}

#[test]
fn four_workers_visit_each_enabled_robot_once() {
    check(4);
}

#[test]
fn four_workers_spread_visits_by_assignment() {
    let (_, visits) = run(4);
    let workers: std::collections::BTreeSet<_> =
        visits.iter().filter_map(|v| v.thread.clone()).collect();
    assert!(workers.len() > 1, "{workers:?}");
}
