use crate::linalg::qr::tiled::graph::{Task, TaskGraph};

/// Final state of an executed task.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    Failed,
}

/// Hooks called by the scheduler on task state transitions.
///
/// Hooks may be called from several workers at once. `task_ready` is called while the scheduler
/// lock is held, so it must not block, and it always precedes `task_started` for the same task.
/// The other hooks are called outside of the lock. `task_finished` for a task is always called
/// before any task that depends on it is reported as ready.
pub trait Observer: Sync {
    /// Called once, before any task is dispatched.
    fn run_started(&self, graph: &TaskGraph, workers: usize) {
        let _ = (graph, workers);
    }

    /// Called when a task becomes ready.
    fn task_ready(&self, task: &Task) {
        let _ = task;
    }

    /// Called by worker `worker` right before running `task`.
    fn task_started(&self, task: &Task, worker: usize) {
        let _ = (task, worker);
    }

    /// Called by worker `worker` right after `task` ran.
    fn task_finished(&self, task: &Task, worker: usize, outcome: TaskOutcome) {
        let _ = (task, worker, outcome);
    }
}
