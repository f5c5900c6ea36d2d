//! A fixed pool of persistent worker threads.
//!
//! Workers are created once, when the threaded scheduler is built, and
//! live until the simulation is torn down. Each call to
//! [`WorkerPool::run`] hands the same task to every worker and blocks
//! until all of them have reported back, which makes every phase a
//! barrier.
//!
//! ```text
//!   coordinator ──Run(task)──► worker 0 ──┐
//!               ──Run(task)──► worker 1 ──┼──(index, result)──► coordinator
//!               ──Run(task)──► worker n ──┘
//! ```
//!
//! Shutdown is cooperative: the stop flag is raised, each worker is sent a
//! stop command, and the coordinator joins every thread, checking
//! that each one exited because it was asked to.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::config::{ConfigError, MAX_THREADS};
use crate::error::StepError;

/// Work dispatched to every worker. Receives the worker index.
pub type Task = Arc<dyn Fn(usize) -> Result<(), StepError> + Send + Sync>;

enum Command {
    Run(Task),
    Stop,
}

/// Why a worker thread returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker saw the stop request.
    Cancelled,
    /// The coordinator's channels went away first.
    Disconnected,
}

// ── PoolShutdownReport ─────────────────────────────────────────────

/// Outcome of tearing down a [`WorkerPool`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolShutdownReport {
    /// Workers whose thread was joined without panicking.
    pub workers_joined: usize,
    /// Workers that exited with [`WorkerExit::Cancelled`].
    pub cancelled: usize,
    /// Workers that exited for any other reason.
    pub anomalies: usize,
}

// ── WorkerPool ─────────────────────────────────────────────────────

struct Worker {
    commands: Sender<Command>,
    handle: Option<JoinHandle<WorkerExit>>,
}

/// Persistent worker threads named `hive-worker-{i}`.
pub struct WorkerPool {
    workers: Vec<Worker>,
    done: Receiver<(usize, Result<(), StepError>)>,
    stop: Arc<AtomicBool>,
    pinned: usize,
    stopped: bool,
}

impl WorkerPool {
    /// Spawn `threads` workers, optionally pinning worker *i* to logical
    /// core *i*.
    ///
    /// Pinning is best effort: a platform without affinity support, a
    /// missing core or a refused request is logged and the worker runs
    /// unpinned.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidThreadCount`] for zero or more than
    /// [`MAX_THREADS`] workers; [`ConfigError::ThreadSpawnFailed`] if the
    /// OS refuses a thread, after the workers already started have been
    /// shut down.
    pub fn new(threads: usize, pin: bool) -> Result<Self, ConfigError> {
        if threads == 0 || threads > MAX_THREADS {
            return Err(ConfigError::InvalidThreadCount {
                requested: threads,
                max: MAX_THREADS,
            });
        }

        let cores = if pin {
            let cores = core_affinity::get_core_ids();
            if cores.is_none() {
                warn!("core affinity is not supported on this platform; workers run unpinned");
            }
            cores.unwrap_or_default()
        } else {
            Vec::new()
        };

        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();
        let mut pool = Self {
            workers: Vec::with_capacity(threads),
            done: done_rx,
            stop: Arc::new(AtomicBool::new(false)),
            pinned: 0,
            stopped: false,
        };

        for index in 0..threads {
            let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
            let done_tx = done_tx.clone();
            let ready_tx = ready_tx.clone();
            let stop = Arc::clone(&pool.stop);
            let core = if pin { cores.get(index).copied() } else { None };
            let spawned = thread::Builder::new()
                .name(format!("hive-worker-{index}"))
                .spawn(move || {
                    let pinned = core.map(core_affinity::set_for_current);
                    // The coordinator may already be gone if a later spawn failed.
                    let _ = ready_tx.send((index, pinned));
                    drop(ready_tx);
                    worker_loop(index, &cmd_rx, &done_tx, &stop)
                });
            match spawned {
                Ok(handle) => pool.workers.push(Worker {
                    commands: cmd_tx,
                    handle: Some(handle),
                }),
                Err(e) => {
                    pool.shutdown();
                    return Err(ConfigError::ThreadSpawnFailed {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }
        drop(ready_tx);

        for _ in 0..threads {
            match ready_rx.recv() {
                Ok((_, Some(true))) => pool.pinned += 1,
                Ok((index, Some(false))) => {
                    warn!(worker = index, "failed to pin worker to its core; running unpinned");
                }
                Ok((index, None)) if pin => {
                    warn!(worker = index, "no core available for worker; running unpinned");
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }

        debug!(threads, pinned = pool.pinned, "worker pool started");
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers successfully pinned to a core.
    pub fn pinned_workers(&self) -> usize {
        self.pinned
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Run `task` on every worker and wait for all of them.
    ///
    /// Returns the error of the lowest-indexed failing worker. A panic
    /// inside the task is caught on the worker and reported as
    /// [`StepError::WorkerPanicked`]; the worker stays usable.
    pub fn run(&mut self, task: Task) -> Result<(), StepError> {
        if self.stopped {
            return Err(StepError::PoolDisconnected);
        }
        let mut lost = None;
        let mut sent = 0;
        for (index, worker) in self.workers.iter().enumerate() {
            if worker.commands.send(Command::Run(Arc::clone(&task))).is_err() {
                lost.get_or_insert(index);
                continue;
            }
            sent += 1;
        }
        drop(task);

        let mut results: Vec<Option<Result<(), StepError>>> = vec![None; self.workers.len()];
        for _ in 0..sent {
            let (index, result) = self.done.recv().map_err(|_| StepError::PoolDisconnected)?;
            results[index] = Some(result);
        }
        if let Some(worker) = lost {
            return Err(StepError::WorkerLost { worker });
        }
        results.into_iter().flatten().collect::<Result<Vec<()>, _>>()?;
        Ok(())
    }

    /// Stop every worker and join its thread.
    ///
    /// Idempotent: later calls return an empty report. Workers that did
    /// not exit with [`WorkerExit::Cancelled`] are logged.
    pub fn shutdown(&mut self) -> PoolShutdownReport {
        if self.stopped {
            return PoolShutdownReport::default();
        }
        self.stopped = true;
        self.stop.store(true, Ordering::Release);
        for worker in &self.workers {
            // A worker that already exited has dropped its receiver.
            let _ = worker.commands.send(Command::Stop);
        }

        let mut report = PoolShutdownReport::default();
        for (index, worker) in self.workers.iter_mut().enumerate() {
            let Some(handle) = worker.handle.take() else {
                continue;
            };
            match handle.join() {
                Ok(WorkerExit::Cancelled) => {
                    report.workers_joined += 1;
                    report.cancelled += 1;
                }
                Ok(exit) => {
                    report.workers_joined += 1;
                    report.anomalies += 1;
                    warn!(worker = index, ?exit, "worker exited without being cancelled");
                }
                Err(_) => {
                    report.anomalies += 1;
                    warn!(worker = index, "worker thread panicked outside a task");
                }
            }
        }
        debug!(
            joined = report.workers_joined,
            anomalies = report.anomalies,
            "worker pool stopped"
        );
        report
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .field("pinned", &self.pinned)
            .field("stopped", &self.stopped)
            .finish()
    }
}

fn worker_loop(
    index: usize,
    commands: &Receiver<Command>,
    done: &Sender<(usize, Result<(), StepError>)>,
    stop: &AtomicBool,
) -> WorkerExit {
    loop {
        if stop.load(Ordering::Acquire) {
            return WorkerExit::Cancelled;
        }
        let task = match commands.recv() {
            Ok(Command::Run(task)) => task,
            Ok(Command::Stop) => return WorkerExit::Cancelled,
            Err(_) => return WorkerExit::Disconnected,
        };
        let result = match panic::catch_unwind(AssertUnwindSafe(|| task(index))) {
            Ok(result) => result,
            Err(payload) => Err(StepError::WorkerPanicked {
                worker: index,
                message: panic_message(payload.as_ref()),
            }),
        };
        // Release shared data before the coordinator resumes.
        drop(task);
        if done.send((index, result)).is_err() {
            return WorkerExit::Disconnected;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
