//! Step schedulers: who runs Sense, Control and Act, and on which thread.
//!
//! Both schedulers honour the same contract. Every enabled controllable
//! entity completes a phase before any entity starts the next one, and a
//! controller failure aborts the step with [`StepError::Controller`].
//!
//! The [`SequentialScheduler`] walks the entity list on the calling
//! thread. The [`ThreadedScheduler`] splits the list into one contiguous
//! range per worker and dispatches each phase to a [`WorkerPool`]; the
//! pool's completion wait is the barrier between phases.
//!
//! Loop functions can borrow the same machinery through
//! [`Scheduler::for_each_controllable`], which runs an arbitrary visitor
//! over every enabled controllable entity with the current split.

use std::ops::Range;
use std::sync::Arc;

use hive_core::{EntityKey, Phase};
use tracing::{debug, info};

use crate::balance::BalancePolicy;
use crate::config::{ConfigError, ThreadingConfig};
use crate::entity::{Controllable, EntityHandle, StepContext};
use crate::error::StepError;
use crate::pool::{PoolShutdownReport, Task, WorkerPool};
use crate::view::WorldView;

/// Everything a scheduler needs to run one controller phase.
#[derive(Clone)]
pub struct PhaseBatch {
    /// Controllable entities in registry order.
    pub entities: Arc<[(EntityKey, EntityHandle)]>,
    /// Registry membership version the list was taken at.
    pub generation: u64,
    /// Snapshot every controller senses against.
    pub view: Arc<WorldView>,
}

impl std::fmt::Debug for PhaseBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseBatch")
            .field("entities", &self.entities.len())
            .field("generation", &self.generation)
            .field("tick", &self.view.tick())
            .finish()
    }
}

/// Per-entity callback for [`Scheduler::for_each_controllable`].
///
/// Runs on worker threads, so it may only touch the entity it is given
/// and state it synchronises itself.
pub type ControllableVisitor = Arc<dyn Fn(&StepContext<'_>, &mut dyn Controllable) + Send + Sync>;

/// Executes the controller phases of a step.
pub trait Scheduler: Send {
    /// Worker threads in use. `0` for the sequential scheduler.
    fn num_threads(&self) -> usize;

    /// Run `phase` for every enabled entity in `batch` and return once
    /// all of them are done.
    fn run_phase(&mut self, phase: Phase, batch: &PhaseBatch) -> Result<(), StepError>;

    /// Call `visit` once for every enabled controllable entity in `batch`
    /// and return once all calls are done.
    ///
    /// Uses the same work split and barrier as [`run_phase`](Self::run_phase).
    fn for_each_controllable(
        &mut self,
        batch: &PhaseBatch,
        visit: ControllableVisitor,
    ) -> Result<(), StepError>;

    /// Current entity range of each worker.
    fn assignment(&self) -> &[Range<usize>] {
        &[]
    }

    /// Workers pinned to a core.
    fn pinned_workers(&self) -> usize {
        0
    }

    /// Stop worker threads, if any.
    fn shutdown(&mut self) -> Option<PoolShutdownReport> {
        None
    }
}

/// Drive `phase` on each enabled entity of `entities`, in order.
///
/// Entities without the controller capability and non-controller phases
/// are ignored.
pub fn run_controllers(
    phase: Phase,
    entities: &[(EntityKey, EntityHandle)],
    view: &WorldView,
) -> Result<(), StepError> {
    if !phase.is_controller_phase() {
        return Ok(());
    }
    for (key, handle) in entities {
        let mut entity = handle.lock();
        if !entity.is_enabled() {
            continue;
        }
        let ctx = StepContext::new(*key, view);
        let result = match entity.as_controllable_mut() {
            Some(c) => match phase {
                Phase::Sense => c.sense(&ctx),
                Phase::Control => c.control_step(&ctx),
                _ => c.act(&ctx),
            },
            None => continue,
        };
        if let Err(source) = result {
            return Err(StepError::Controller {
                entity: entity.id().to_owned(),
                phase,
                source,
            });
        }
    }
    Ok(())
}

/// Call `visit` on each enabled controllable entity of `entities`, in
/// order.
pub fn visit_controllables(
    entities: &[(EntityKey, EntityHandle)],
    view: &WorldView,
    visit: &(dyn Fn(&StepContext<'_>, &mut dyn Controllable) + Send + Sync),
) {
    for (key, handle) in entities {
        let mut entity = handle.lock();
        if !entity.is_enabled() {
            continue;
        }
        if let Some(c) = entity.as_controllable_mut() {
            visit(&StepContext::new(*key, view), c);
        }
    }
}

// ── SequentialScheduler ────────────────────────────────────────────

/// Runs every phase on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn num_threads(&self) -> usize {
        0
    }

    fn run_phase(&mut self, phase: Phase, batch: &PhaseBatch) -> Result<(), StepError> {
        run_controllers(phase, &batch.entities, &batch.view)
    }

    fn for_each_controllable(
        &mut self,
        batch: &PhaseBatch,
        visit: ControllableVisitor,
    ) -> Result<(), StepError> {
        visit_controllables(&batch.entities, &batch.view, &*visit);
        Ok(())
    }
}

// ── ThreadedScheduler ──────────────────────────────────────────────

/// Dispatches each phase to a fixed worker pool.
///
/// Worker *i* always handles range *i* of the current assignment. The
/// assignment is recomputed only when the registry generation or the
/// entity count changes.
#[derive(Debug)]
pub struct ThreadedScheduler {
    pool: WorkerPool,
    balance: BalancePolicy,
    assignment: Arc<[Range<usize>]>,
    assigned: Option<(u64, usize)>,
}

impl ThreadedScheduler {
    /// Start `threads` workers.
    pub fn new(threads: usize, pin: bool, balance: BalancePolicy) -> Result<Self, ConfigError> {
        let pool = WorkerPool::new(threads, pin)?;
        info!(
            threads,
            pinned = pool.pinned_workers(),
            ?balance,
            "threaded scheduler started"
        );
        Ok(Self {
            pool,
            balance,
            assignment: Arc::from(Vec::new()),
            assigned: None,
        })
    }

    /// Balancing policy in use.
    pub fn balance(&self) -> BalancePolicy {
        self.balance
    }

    fn assignment_for(&mut self, batch: &PhaseBatch) -> Arc<[Range<usize>]> {
        if self.assigned != Some((batch.generation, batch.entities.len())) {
            self.rebalance(batch);
        }
        Arc::clone(&self.assignment)
    }

    fn rebalance(&mut self, batch: &PhaseBatch) {
        let costs: Vec<usize> = match self.balance {
            BalancePolicy::Length => vec![1; batch.entities.len()],
            BalancePolicy::Quantity => batch
                .entities
                .iter()
                .map(|(_, h)| h.lock().as_controllable().map_or(1, |c| c.cost()))
                .collect(),
        };
        self.assignment = self.balance.partition(&costs, self.pool.threads()).into();
        self.assigned = Some((batch.generation, batch.entities.len()));
        debug!(
            generation = batch.generation,
            entities = batch.entities.len(),
            workers = self.pool.threads(),
            "thread assignment recomputed"
        );
    }
}

impl Scheduler for ThreadedScheduler {
    fn num_threads(&self) -> usize {
        self.pool.threads()
    }

    fn run_phase(&mut self, phase: Phase, batch: &PhaseBatch) -> Result<(), StepError> {
        let assignment = self.assignment_for(batch);
        let entities = Arc::clone(&batch.entities);
        let view = Arc::clone(&batch.view);
        let task: Task = Arc::new(move |worker: usize| {
            let range = assignment.get(worker).cloned().unwrap_or(0..0);
            run_controllers(phase, &entities[range], &view)
        });
        self.pool.run(task)
    }

    fn for_each_controllable(
        &mut self,
        batch: &PhaseBatch,
        visit: ControllableVisitor,
    ) -> Result<(), StepError> {
        let assignment = self.assignment_for(batch);
        let entities = Arc::clone(&batch.entities);
        let view = Arc::clone(&batch.view);
        let task: Task = Arc::new(move |worker: usize| {
            let range = assignment.get(worker).cloned().unwrap_or(0..0);
            visit_controllables(&entities[range], &view, &*visit);
            Ok(())
        });
        self.pool.run(task)
    }

    fn assignment(&self) -> &[Range<usize>] {
        &self.assignment
    }

    fn pinned_workers(&self) -> usize {
        self.pool.pinned_workers()
    }

    fn shutdown(&mut self) -> Option<PoolShutdownReport> {
        Some(self.pool.shutdown())
    }
}

/// Build the scheduler selected by `config`.
pub fn scheduler_for(config: &ThreadingConfig) -> Result<Box<dyn Scheduler>, ConfigError> {
    config.validate()?;
    if config.is_sequential() {
        info!("sequential scheduler selected");
        return Ok(Box::new(SequentialScheduler));
    }
    Ok(Box::new(ThreadedScheduler::new(
        config.threads,
        config.pin_to_cores,
        config.balance,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{handle, Controllable, Entity};
    use hive_core::ControllerError;
    use parking_lot::Mutex;

    struct Stub {
        id: String,
        enabled: bool,
        cost: usize,
        log: Arc<Mutex<Vec<(Phase, String)>>>,
        fail_in: Option<Phase>,
    }

    impl Stub {
        fn record(&mut self, phase: Phase) -> Result<(), ControllerError> {
            self.log.lock().push((phase, self.id.clone()));
            if self.fail_in == Some(phase) {
                return Err(ControllerError::failed("stub"));
            }
            Ok(())
        }
    }

    impl Controllable for Stub {
        fn sense(&mut self, _: &StepContext<'_>) -> Result<(), ControllerError> {
            self.record(Phase::Sense)
        }
        fn control_step(&mut self, _: &StepContext<'_>) -> Result<(), ControllerError> {
            self.record(Phase::Control)
        }
        fn act(&mut self, _: &StepContext<'_>) -> Result<(), ControllerError> {
            self.record(Phase::Act)
        }
        fn cost(&self) -> usize {
            self.cost
        }
    }

    impl Entity for Stub {
        fn id(&self) -> &str {
            &self.id
        }
        fn type_name(&self) -> &str {
            "stub"
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
        fn as_controllable(&self) -> Option<&dyn Controllable> {
            Some(self)
        }
        fn as_controllable_mut(&mut self) -> Option<&mut dyn Controllable> {
            Some(self)
        }
    }

    type Log = Arc<Mutex<Vec<(Phase, String)>>>;

    fn batch(n: usize, log: &Log, cost: impl Fn(usize) -> usize) -> PhaseBatch {
        let entities: Vec<(EntityKey, EntityHandle)> = (0..n)
            .map(|i| {
                let stub = Stub {
                    id: format!("p{i}"),
                    enabled: i != 1,
                    cost: cost(i),
                    log: Arc::clone(log),
                    fail_in: None,
                };
                (EntityKey(i as u64), handle(stub))
            })
            .collect();
        PhaseBatch {
            entities: entities.into(),
            generation: 1,
            view: Arc::new(WorldView::default()),
        }
    }

    #[test]
    fn sequential_skips_disabled_entities() {
        let log = Log::default();
        let b = batch(3, &log, |_| 1);
        let mut s = SequentialScheduler;
        for phase in Phase::CONTROLLER {
            s.run_phase(phase, &b).unwrap();
        }
        let names: Vec<_> = log.lock().iter().map(|(p, id)| format!("{p}:{id}")).collect();
        assert_eq!(
            names,
            vec!["sense:p0", "sense:p2", "control:p0", "control:p2", "act:p0", "act:p2"]
        );
        assert_eq!(s.num_threads(), 0);
    }

    #[test]
    fn threaded_phases_are_barriers() {
        let log = Log::default();
        let b = batch(40, &log, |_| 1);
        let mut s = ThreadedScheduler::new(4, false, BalancePolicy::Length).unwrap();
        for phase in Phase::CONTROLLER {
            s.run_phase(phase, &b).unwrap();
        }
        let phases: Vec<Phase> = log.lock().iter().map(|(p, _)| *p).collect();
        assert_eq!(phases.len(), 3 * 39);
        assert!(phases.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(s.assignment(), &[0..10, 10..20, 20..30, 30..40]);
    }

    #[test]
    fn quantity_uses_controller_cost() {
        let log = Log::default();
        let b = batch(13, &log, |i| if i == 0 { 12 } else { 1 });
        let mut s = ThreadedScheduler::new(2, false, BalancePolicy::Quantity).unwrap();
        s.run_phase(Phase::Sense, &b).unwrap();
        assert_eq!(s.assignment(), &[0..1, 1..13]);
    }

    #[test]
    fn assignment_follows_generation() {
        let log = Log::default();
        let mut s = ThreadedScheduler::new(2, false, BalancePolicy::Length).unwrap();
        s.run_phase(Phase::Sense, &batch(4, &log, |_| 1)).unwrap();
        assert_eq!(s.assignment(), &[0..2, 2..4]);
        let mut grown = batch(6, &log, |_| 1);
        grown.generation = 2;
        s.run_phase(Phase::Sense, &grown).unwrap();
        assert_eq!(s.assignment(), &[0..3, 3..6]);
    }

    #[test]
    fn controller_failure_names_entity_and_phase() {
        let log = Log::default();
        let b = batch(8, &log, |_| 1);
        let failing = Stub {
            id: "bad".into(),
            enabled: true,
            cost: 1,
            log: Arc::clone(&log),
            fail_in: Some(Phase::Control),
        };
        let mut entities: Vec<_> = b.entities.iter().cloned().collect();
        entities[5] = (EntityKey(5), handle(failing));
        let b = PhaseBatch {
            entities: entities.into(),
            ..b
        };

        for threads in [0, 3] {
            let mut s = scheduler_for(&ThreadingConfig::threads(threads)).unwrap();
            s.run_phase(Phase::Sense, &b).unwrap();
            let err = s.run_phase(Phase::Control, &b).unwrap_err();
            assert_eq!(
                err,
                StepError::Controller {
                    entity: "bad".into(),
                    phase: Phase::Control,
                    source: ControllerError::failed("stub"),
                }
            );
        }
    }

    fn visitor<F>(f: F) -> ControllableVisitor
    where
        F: Fn(&StepContext<'_>, &mut dyn Controllable) + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn visitor_reaches_each_enabled_entity_once() {
        let log = Log::default();
        let b = batch(10, &log, |_| 1);
        for threads in [0, 3] {
            let mut s = scheduler_for(&ThreadingConfig::threads(threads)).unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            s.for_each_controllable(
                &b,
                visitor(move |ctx, c| sink.lock().push((ctx.key(), c.cost()))),
            )
            .unwrap();
            let mut seen = seen.lock().clone();
            seen.sort_unstable();
            let expected: Vec<_> = (0..10u64)
                .filter(|&i| i != 1)
                .map(|i| (EntityKey(i), 1))
                .collect();
            assert_eq!(seen, expected, "threads = {threads}");
        }
        assert!(log.lock().is_empty());
    }

    #[test]
    fn shutdown_cancels_workers() {
        let mut s = scheduler_for(&ThreadingConfig::threads(2)).unwrap();
        let report = s.shutdown().unwrap();
        assert_eq!(report.cancelled, 2);
        assert!(SequentialScheduler.shutdown().is_none());
    }
}
