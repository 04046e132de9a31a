//! Task graph of the tiled QR factorization.
//!
//! [`TaskGraph::build`] emits the kernel invocations of a full factorization in a fixed total
//! order that is a valid serialization of their dependencies. Each task carries the exact set of
//! tiles it reads and writes, so that hazards can be derived without knowledge of the kernels.

use crate::{
    assert,
    linalg::kernels::KernelKind,
    tile::{DataHandle, TileIndex, TileLayout},
};
use serde::Serialize;
use std::collections::HashMap;

/// Position of a task in the emission order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How a task accesses a tile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AccessMode {
    Read,
    Write,
}

/// One tile operand of a task.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Access {
    pub handle: DataHandle,
    pub mode: AccessMode,
}

impl Access {
    #[inline]
    const fn read(handle: DataHandle) -> Self {
        Self {
            handle,
            mode: AccessMode::Read,
        }
    }

    #[inline]
    const fn write(handle: DataHandle) -> Self {
        Self {
            handle,
            mode: AccessMode::Write,
        }
    }
}

/// A kernel invocation. Immutable once built.
///
/// The operands are ordered as the kernel expects them:
/// - `dgeqrt`: `A(k, k)`, `T(k, k)`
/// - `dlarfb`: `A(k, k)`, `T(k, k)`, `A(k, j)`
/// - `dtpqrt`: `A(k, k)`, `A(i, k)`, `T(i, k)`
/// - `dtpmqrt`: `A(i, k)`, `T(i, k)`, `A(k, j)`, `A(i, j)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub kind: KernelKind,
    /// Panel iteration `k` the task belongs to.
    pub iteration: usize,
    pub accesses: Vec<Access>,
}

impl Task {
    /// Handle of the `i`-th operand.
    #[inline]
    #[track_caller]
    pub fn operand(&self, i: usize) -> DataHandle {
        self.accesses[i].handle
    }

    /// The matrix tile whose contents the task produces, used to report failures.
    #[inline]
    pub fn target(&self) -> TileIndex {
        let i = match self.kind {
            KernelKind::Geqrt => 0,
            KernelKind::Larfb => 2,
            KernelKind::Tpqrt => 1,
            KernelKind::Tpmqrt => 3,
        };
        self.operand(i).index
    }

    /// Returns `true` if the task writes to `handle`.
    #[inline]
    pub fn writes(&self, handle: DataHandle) -> bool {
        self.accesses
            .iter()
            .any(|a| a.handle == handle && a.mode == AccessMode::Write)
    }
}

/// The ordered list of tasks of a tiled QR factorization.
#[derive(Clone, Debug)]
pub struct TaskGraph {
    layout: TileLayout,
    tasks: Vec<Task>,
}

impl TaskGraph {
    /// Emits the tasks of the factorization of a matrix tiled by `layout`.
    ///
    /// For each panel iteration `k`:
    /// 1. `dgeqrt` on `A(k, k)`;
    /// 2. `dlarfb` on `A(k, j)` for every `j > k`;
    /// 3. for every `i > k`, `dtpqrt` on `A(i, k)`, followed by `dtpmqrt` on the pair
    ///    `A(k, j)`, `A(i, j)` for every `j > k`.
    pub fn build(layout: &TileLayout) -> Self {
        let rb = layout.row_blocks();
        let cb = layout.col_blocks();
        let mut tasks = Vec::new();

        let mut push = |kind: KernelKind, iteration: usize, accesses: Vec<Access>| {
            for access in &accesses {
                assert!(layout.contains(access.handle.index));
            }
            tasks.push(Task {
                id: TaskId(tasks.len()),
                kind,
                iteration,
                accesses,
            });
        };

        for k in 0..layout.diagonal_count() {
            push(
                KernelKind::Geqrt,
                k,
                vec![Access::write(DataHandle::a(k, k)), Access::write(DataHandle::t(k, k))],
            );

            for j in k + 1..cb {
                push(
                    KernelKind::Larfb,
                    k,
                    vec![
                        Access::read(DataHandle::a(k, k)),
                        Access::read(DataHandle::t(k, k)),
                        Access::write(DataHandle::a(k, j)),
                    ],
                );
            }

            for i in k + 1..rb {
                push(
                    KernelKind::Tpqrt,
                    k,
                    vec![
                        Access::write(DataHandle::a(k, k)),
                        Access::write(DataHandle::a(i, k)),
                        Access::write(DataHandle::t(i, k)),
                    ],
                );

                for j in k + 1..cb {
                    push(
                        KernelKind::Tpmqrt,
                        k,
                        vec![
                            Access::read(DataHandle::a(i, k)),
                            Access::read(DataHandle::t(i, k)),
                            Access::write(DataHandle::a(k, j)),
                            Access::write(DataHandle::a(i, j)),
                        ],
                    );
                }
            }
        }

        log::debug!(
            "built {} tasks for a {}x{} tiling ({} panel iterations)",
            tasks.len(),
            rb,
            cb,
            layout.diagonal_count(),
        );

        Self {
            layout: *layout,
            tasks,
        }
    }

    #[inline]
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    /// Tasks in emission order. The position of a task is its id.
    #[inline]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of tasks of the given kind, optionally restricted to one panel iteration.
    pub fn count(&self, kind: KernelKind, iteration: Option<usize>) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.kind == kind && iteration.map_or(true, |k| t.iteration == k))
            .count()
    }

    /// For every task, the earlier tasks it has a read-after-write, write-after-read or
    /// write-after-write hazard with, sorted by id.
    pub fn dependencies(&self) -> Vec<Vec<TaskId>> {
        #[derive(Default)]
        struct HandleState {
            last_writer: Option<TaskId>,
            readers: Vec<TaskId>,
        }

        let mut state = HashMap::<DataHandle, HandleState>::new();
        let mut deps = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            let mut preds = Vec::new();
            for access in &task.accesses {
                let s = state.entry(access.handle).or_default();
                preds.extend(s.last_writer);
                match access.mode {
                    AccessMode::Read => s.readers.push(task.id),
                    AccessMode::Write => {
                        preds.append(&mut s.readers);
                        s.last_writer = Some(task.id);
                    }
                }
            }
            preds.sort_unstable();
            preds.dedup();
            deps.push(preds);
        }
        deps
    }

    /// Edges `(predecessor, successor)` of the dependency graph.
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        self.dependencies()
            .into_iter()
            .enumerate()
            .flat_map(|(succ, preds)| preds.into_iter().map(move |p| (p, TaskId(succ))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    fn graph(m: usize, n: usize, b: usize) -> TaskGraph {
        TaskGraph::build(&TileLayout::new(m, n, n, b).unwrap())
    }

    #[test]
    fn four_by_four_with_two_by_two_tiles() {
        let g = graph(4, 4, 2);
        let kinds: Vec<_> = g.tasks().iter().map(|t| (t.kind, t.iteration)).collect();
        assert!(
            kinds
                == [
                    (KernelKind::Geqrt, 0),
                    (KernelKind::Larfb, 0),
                    (KernelKind::Tpqrt, 0),
                    (KernelKind::Tpmqrt, 0),
                    (KernelKind::Geqrt, 1),
                ]
        );
        let pair = &g.tasks()[3];
        assert!(pair.operand(2) == DataHandle::a(0, 1));
        assert!(pair.operand(3) == DataHandle::a(1, 1));
        assert!(pair.target() == TileIndex::new(1, 1));
    }

    #[test]
    fn counts_for_non_square_tilings() {
        for (m, n, b) in [(10, 7, 3), (7, 10, 3), (9, 9, 2), (5, 1, 2), (1, 5, 2)] {
            let layout = TileLayout::new(m, n, n, b).unwrap();
            let (rb, cb) = (layout.row_blocks(), layout.col_blocks());
            let g = TaskGraph::build(&layout);

            let mut expected = [0usize; 4];
            for k in 0..Ord::min(rb, cb) {
                expected[0] += 1;
                expected[1] += cb - k - 1;
                expected[2] += rb - k - 1;
                expected[3] += (rb - k - 1) * (cb - k - 1);
            }
            for (kind, expected) in KernelKind::ALL.into_iter().zip(expected) {
                assert!(g.count(kind, None) == expected);
            }
        }
    }

    #[test]
    fn every_trailing_tile_is_updated_by_each_elimination() {
        let g = graph(11, 8, 3);
        let layout = *g.layout();
        for k in 0..layout.diagonal_count() {
            for i in k + 1..layout.row_blocks() {
                for j in k + 1..layout.col_blocks() {
                    assert!(g.tasks().iter().any(|t| t.kind == KernelKind::Tpmqrt
                        && t.iteration == k
                        && t.operand(0) == DataHandle::a(i, k)
                        && t.writes(DataHandle::a(i, j))
                        && t.writes(DataHandle::a(k, j))));
                }
            }
        }
    }

    #[test]
    fn dependencies_point_backwards() {
        let g = graph(9, 9, 3);
        for (id, preds) in g.dependencies().iter().enumerate() {
            for p in preds {
                assert!(p.0 < id);
            }
        }

        let deps = graph(4, 4, 2).dependencies();
        // dtpqrt(1, 0) waits for the panel update, which reads A(0, 0)
        assert!(deps[2] == [TaskId(0), TaskId(1)]);
        // dtpmqrt waits for the elimination and the panel update of A(0, 1)
        assert!(deps[3] == [TaskId(1), TaskId(2)]);
        assert!(deps[4] == [TaskId(3)]);
    }

    #[test]
    fn edges_match_dependencies() {
        let g = graph(6, 6, 2);
        let deps = g.dependencies();
        let edges = g.edges();
        assert!(edges.len() == deps.iter().map(Vec::len).sum::<usize>());
        assert!(edges.iter().all(|(p, s)| p < s));
    }
}
