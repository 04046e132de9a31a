//! Execution traces.
//!
//! [`TraceRecorder`] is an [`Observer`] that records when and where every task ran, together with
//! the dependency edges of the graph and the number of ready and running tasks over time. The
//! resulting [`Trace`] can be exported as CSV files for timeline and DAG viewers.

use crate::{
    linalg::{
        kernels::KernelKind,
        qr::tiled::graph::{Task, TaskGraph, TaskId},
    },
    sched::{Observer, TaskOutcome},
    Error, Result,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::{fs::File, path::Path, time::Instant};

/// One executed task.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskRecord {
    pub job_id: TaskId,
    pub kernel: KernelKind,
    pub worker: usize,
    pub iteration: usize,
    /// Start offset from the beginning of the run, in microseconds.
    pub start: f64,
    /// End offset from the beginning of the run, in microseconds.
    pub end: f64,
    /// `end - start`, in microseconds.
    pub duration: f64,
    pub failed: bool,
}

/// One edge of the dependency graph: `dependent` can only start once `job_id` is done.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EdgeRecord {
    pub job_id: TaskId,
    pub dependent: TaskId,
}

/// Number of ready and submitted tasks at a given time.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct CounterSample {
    /// Offset from the beginning of the run, in microseconds.
    pub time: f64,
    /// Tasks whose hazards have cleared but that have not started.
    pub ready: usize,
    /// Tasks handed to a worker and not finished yet.
    pub submitted: usize,
}

/// A recorded run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trace {
    pub workers: usize,
    pub tasks: Vec<TaskRecord>,
    pub edges: Vec<EdgeRecord>,
    pub counters: Vec<CounterSample>,
}

impl Trace {
    /// Writes `tasks.csv`, `dag.csv` and `counters.csv` to `dir`, creating it if needed.
    pub fn write_csv(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        write_records(&dir.join("tasks.csv"), &self.tasks)?;
        write_records(&dir.join("dag.csv"), &self.edges)?;
        write_records(&dir.join("counters.csv"), &self.counters)?;
        log::debug!("trace written to {}", dir.display());
        Ok(())
    }
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let file = File::create(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = csv::Writer::from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

struct Running {
    start: f64,
}

struct Inner {
    origin: Instant,
    trace: Trace,
    running: Vec<Option<Running>>,
    ready: usize,
    submitted: usize,
}

impl Inner {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1e6
    }

    fn sample(&mut self) {
        let time = self.now();
        let (ready, submitted) = (self.ready, self.submitted);
        self.trace.counters.push(CounterSample {
            time,
            ready,
            submitted,
        });
    }
}

/// Records an execution [`Trace`].
pub struct TraceRecorder {
    inner: Mutex<Inner>,
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                origin: Instant::now(),
                trace: Trace::default(),
                running: Vec::new(),
                ready: 0,
                submitted: 0,
            }),
        }
    }

    /// Returns the trace recorded so far, tasks sorted by start time.
    pub fn trace(&self) -> Trace {
        let inner = self.inner.lock();
        let mut trace = inner.trace.clone();
        trace.tasks.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.job_id.cmp(&b.job_id)));
        trace
    }
}

impl Observer for TraceRecorder {
    fn run_started(&self, graph: &TaskGraph, workers: usize) {
        let mut inner = self.inner.lock();
        inner.origin = Instant::now();
        inner.trace = Trace {
            workers,
            tasks: Vec::with_capacity(graph.len()),
            edges: graph
                .edges()
                .into_iter()
                .map(|(job_id, dependent)| EdgeRecord { job_id, dependent })
                .collect(),
            counters: Vec::new(),
        };
        inner.running = (0..graph.len()).map(|_| None).collect();
        inner.ready = 0;
        inner.submitted = 0;
    }

    fn task_ready(&self, _task: &Task) {
        let mut inner = self.inner.lock();
        inner.ready += 1;
        inner.sample();
    }

    fn task_started(&self, task: &Task, _worker: usize) {
        let mut inner = self.inner.lock();
        let start = inner.now();
        if let Some(slot) = inner.running.get_mut(task.id.0) {
            *slot = Some(Running { start });
        }
        inner.ready -= 1;
        inner.submitted += 1;
        inner.sample();
    }

    fn task_finished(&self, task: &Task, worker: usize, outcome: TaskOutcome) {
        let mut inner = self.inner.lock();
        let end = inner.now();
        let start = inner
            .running
            .get_mut(task.id.0)
            .and_then(Option::take)
            .map_or(end, |r| r.start);
        inner.trace.tasks.push(TaskRecord {
            job_id: task.id,
            kernel: task.kind,
            worker,
            iteration: task.iteration,
            start,
            end,
            duration: end - start,
            failed: outcome == TaskOutcome::Failed,
        });
        inner.submitted -= 1;
        inner.sample();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, sched::Scheduler, tile::TileLayout, Parallelism};
    use dyn_stack::StackReq;

    #[test]
    fn records_every_task_and_edge() {
        let graph = TaskGraph::build(&TileLayout::new(6, 6, 6, 2).unwrap());
        let recorder = TraceRecorder::new();
        Scheduler::new(&graph, Parallelism::None)
            .with_observer(&recorder)
            .run(StackReq::empty(), |_, _| Ok(()))
            .unwrap();

        let trace = recorder.trace();
        assert!(trace.workers == 1);
        assert!(trace.tasks.len() == graph.len());
        assert!(trace.edges.len() == graph.edges().len());
        assert!(trace.tasks.iter().all(|t| t.worker == 0 && !t.failed && t.end >= t.start));
        // sequential runs never have more than one task in flight
        assert!(trace.counters.iter().all(|c| c.submitted <= 1));

        let ids: Vec<usize> = trace.tasks.iter().map(|t| t.job_id.0).collect();
        assert!(ids == (0..graph.len()).collect::<Vec<_>>());
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn parallel_counters_stay_consistent() {
        let graph = TaskGraph::build(&TileLayout::new(20, 20, 20, 4).unwrap());
        for _ in 0..10 {
            let recorder = TraceRecorder::new();
            Scheduler::new(&graph, Parallelism::Rayon(4))
                .with_observer(&recorder)
                .run(StackReq::empty(), |_, _| Ok(()))
                .unwrap();

            let trace = recorder.trace();
            assert!(trace.tasks.len() == graph.len());
            assert!(trace.counters.iter().all(|c| c.submitted <= 4 && c.ready <= graph.len()));
            let last = trace.counters.last().unwrap();
            assert!(all(last.ready == 0, last.submitted == 0));
        }
    }

    #[test]
    fn csv_export() {
        let graph = TaskGraph::build(&TileLayout::new(4, 4, 4, 2).unwrap());
        let recorder = TraceRecorder::new();
        Scheduler::new(&graph, Parallelism::None)
            .with_observer(&recorder)
            .run(StackReq::empty(), |_, _| Ok(()))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("trace");
        recorder.trace().write_csv(&out).unwrap();

        let tasks = std::fs::read_to_string(out.join("tasks.csv")).unwrap();
        let mut lines = tasks.lines();
        assert!(lines.next() == Some("job_id,kernel,worker,iteration,start,end,duration,failed"));
        assert!(lines.next().unwrap().starts_with("0,dgeqrt,0,0,"));
        assert!(tasks.lines().count() == 1 + graph.len());

        let dag = std::fs::read_to_string(out.join("dag.csv")).unwrap();
        assert!(dag.lines().next() == Some("job_id,dependent"));
        assert!(dag.lines().any(|l| l == "2,3"));
    }
}
