//! Tile-hazard scheduler.
//!
//! The [`Scheduler`] executes the tasks of a [`TaskGraph`] on a pool of workers. A task becomes
//! ready once every earlier task it conflicts with on some tile has completed, where two tasks
//! conflict if they touch the same tile and at least one of them writes it. Among the ready tasks,
//! the one emitted earliest is always dispatched first, so that a single worker executes the tasks
//! in emission order.
//!
//! On the first failure, no further task is dispatched. Tasks that are already running are
//! allowed to finish, then the error is returned. A panicking task is handled the same way, and
//! the panic is resumed on the calling thread once the workers are drained.

use crate::{
    assert,
    linalg::qr::tiled::graph::{Task, TaskGraph, TaskId},
    utils::thread::parallelism_degree,
    Error, Parallelism, Result,
};
use core::sync::atomic::{AtomicBool, Ordering};
use dyn_stack::{GlobalPodBuffer, PodStack, StackReq};
use parking_lot::{Condvar, Mutex};
use std::{
    any::Any,
    collections::BTreeSet,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

mod hazard;
mod observer;

use hazard::HazardTable;
pub use observer::{Observer, TaskOutcome};

/// Cooperative cancellation flag, shared between the caller and the scheduler.
///
/// Once cancelled, no task that is not already running is started, and the run reports
/// [`Error::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Summary of a completed run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Number of workers that executed tasks.
    pub workers: usize,
    /// Number of tasks that ran to completion.
    pub executed: usize,
    /// Wall-clock time spent executing the graph.
    pub elapsed: Duration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TaskState {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
}

struct State {
    hazards: HazardTable,
    ready: BTreeSet<TaskId>,
    task_state: Vec<TaskState>,
    running: usize,
    remaining: usize,
    halted: bool,
    error: Option<Error>,
    panic: Option<Box<dyn Any + Send>>,
}

impl State {
    /// Moves the candidates that became ready to the ready set, and returns them.
    fn promote(&mut self, tasks: &[Task], candidates: impl IntoIterator<Item = TaskId>) -> Vec<TaskId> {
        let mut promoted = Vec::new();
        for id in candidates {
            if self.task_state[id.0] == TaskState::Pending && self.hazards.is_ready(&tasks[id.0]) {
                self.task_state[id.0] = TaskState::Ready;
                self.ready.insert(id);
                promoted.push(id);
            }
        }
        promoted
    }

    fn halt(&mut self, error: Error) {
        self.halted = true;
        self.error.get_or_insert(error);
    }
}

enum Failure {
    Error(Error),
    Panic(Box<dyn Any + Send>),
}

/// Executes a task graph on a pool of workers, honoring tile hazards.
///
/// The scheduler is built for one run: it is constructed before the tasks are submitted, and
/// drained and discarded by [`Scheduler::run`].
pub struct Scheduler<'a> {
    graph: &'a TaskGraph,
    parallelism: Parallelism,
    cancellation: Option<CancellationToken>,
    observer: Option<&'a dyn Observer>,
}

impl<'a> Scheduler<'a> {
    #[inline]
    pub fn new(graph: &'a TaskGraph, parallelism: Parallelism) -> Self {
        Self {
            graph,
            parallelism,
            cancellation: None,
            observer: None,
        }
    }

    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    #[inline]
    pub fn with_observer(mut self, observer: &'a dyn Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Number of workers the run will use.
    pub fn workers(&self) -> usize {
        let degree = parallelism_degree(self.parallelism);
        Ord::max(1, Ord::min(degree, self.graph.len()))
    }

    /// Runs every task of the graph, calling `execute` with a task and a workspace of at least
    /// `scratch` bytes owned by the calling worker.
    ///
    /// Returns once every task completed, or once the first failure has drained the running
    /// tasks.
    ///
    /// # Errors
    /// The first error returned by `execute`, [`Error::Cancelled`] if the cancellation token was
    /// set before every task could start, or [`Error::WorkerPool`] if the worker threads could
    /// not be spawned.
    ///
    /// # Panics
    /// If `execute` panics, the panic is resumed on the calling thread after the tasks that were
    /// already running have finished.
    pub fn run<F>(self, scratch: StackReq, execute: F) -> Result<ScheduleStats>
    where
        F: Fn(&Task, PodStack<'_>) -> Result<()> + Sync,
    {
        let tasks = self.graph.tasks();
        let workers = self.workers();
        let start = Instant::now();

        let mut state = State {
            hazards: HazardTable::new(tasks),
            ready: BTreeSet::new(),
            task_state: vec![TaskState::Pending; tasks.len()],
            running: 0,
            remaining: tasks.len(),
            halted: false,
            error: None,
            panic: None,
        };

        if let Some(observer) = self.observer {
            observer.run_started(self.graph, workers);
        }
        let initial = state.promote(tasks, tasks.iter().map(|t| t.id));
        self.notify_ready(&initial);

        log::debug!(
            "running {} tasks on {} worker{}",
            tasks.len(),
            workers,
            if workers == 1 { "" } else { "s" },
        );

        let shared = Shared {
            state: Mutex::new(state),
            wakeup: Condvar::new(),
        };

        match self.parallelism {
            Parallelism::None => self.worker_loop(&shared, 0, scratch, &execute),
            #[cfg(feature = "rayon")]
            Parallelism::Rayon(_) => {
                if workers == 1 {
                    self.worker_loop(&shared, 0, scratch, &execute);
                } else {
                    let pool = rayon::ThreadPoolBuilder::new()
                        .num_threads(workers)
                        .thread_name(|idx| format!("tiled-qr-worker-{idx}"))
                        .build()?;
                    let this = &self;
                    let shared = &shared;
                    let execute = &execute;
                    pool.scope(|s| {
                        for worker in 0..workers {
                            s.spawn(move |_| this.worker_loop(shared, worker, scratch, execute));
                        }
                    });
                }
            }
        }

        let state = shared.state.into_inner();
        let elapsed = start.elapsed();
        let executed = tasks.len() - state.remaining;
        if let Some(payload) = state.panic {
            panic::resume_unwind(payload);
        }
        if let Some(error) = state.error {
            log::warn!("run stopped after {executed} of {} tasks: {error}", tasks.len());
            return Err(error);
        }
        assert!(state.remaining == 0);
        log::debug!("ran {executed} tasks in {elapsed:?}");

        Ok(ScheduleStats {
            workers,
            executed,
            elapsed,
        })
    }

    fn notify_ready(&self, ids: &[TaskId]) {
        if let Some(observer) = self.observer {
            for id in ids {
                observer.task_ready(&self.graph.tasks()[id.0]);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().map_or(false, CancellationToken::is_cancelled)
    }

    /// Pops the earliest ready task, waiting for one if needed. Returns `None` once the run is
    /// over for this worker.
    fn next_task(&self, shared: &Shared) -> Option<TaskId> {
        let mut state = shared.state.lock();
        loop {
            if state.halted || state.remaining == 0 {
                return None;
            }
            if self.is_cancelled() {
                log::warn!("cancellation requested, {} tasks left", state.remaining);
                state.halt(Error::Cancelled);
                shared.wakeup.notify_all();
                return None;
            }
            if let Some(id) = state.ready.pop_first() {
                state.task_state[id.0] = TaskState::Running;
                state.running += 1;
                return Some(id);
            }
            // the earliest unfinished task is always ready or running
            assert!(state.running > 0);
            shared.wakeup.wait(&mut state);
        }
    }

    fn worker_loop<F>(&self, shared: &Shared, worker: usize, scratch: StackReq, execute: &F)
    where
        F: Fn(&Task, PodStack<'_>) -> Result<()> + Sync,
    {
        let tasks = self.graph.tasks();
        let mut mem = GlobalPodBuffer::new(scratch);

        while let Some(id) = self.next_task(shared) {
            let task = &tasks[id.0];
            log::trace!("worker {worker}: starting task {id} ({} on {})", task.kind, task.target());
            if let Some(observer) = self.observer {
                observer.task_started(task, worker);
            }

            let result =
                match panic::catch_unwind(AssertUnwindSafe(|| execute(task, PodStack::new(&mut mem)))) {
                    Ok(result) => result.map_err(Failure::Error),
                    Err(payload) => Err(Failure::Panic(payload)),
                };

            let outcome = if result.is_ok() {
                TaskOutcome::Done
            } else {
                TaskOutcome::Failed
            };
            if let Some(observer) = self.observer {
                observer.task_finished(task, worker, outcome);
            }

            let mut state = shared.state.lock();
            state.running -= 1;
            match result {
                Ok(()) => {
                    log::trace!("worker {worker}: finished task {id}");
                    state.task_state[id.0] = TaskState::Done;
                    state.remaining -= 1;
                    let candidates = state.hazards.retire(task);
                    if !state.halted {
                        let promoted = state.promote(tasks, candidates);
                        // reported before any worker can pop them
                        self.notify_ready(&promoted);
                    }
                }
                Err(Failure::Error(error)) => {
                    log::warn!("task {id} ({}) failed: {error}", task.kind);
                    state.task_state[id.0] = TaskState::Failed;
                    state.halt(error);
                }
                Err(Failure::Panic(payload)) => {
                    log::error!("task {id} ({}) panicked", task.kind);
                    state.task_state[id.0] = TaskState::Failed;
                    state.halted = true;
                    state.panic.get_or_insert(payload);
                }
            }
            shared.wakeup.notify_all();
        }
    }
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
}
