use crate::{
    linalg::qr::tiled::graph::{AccessMode, Task, TaskId},
    tile::DataHandle,
};
use std::collections::{HashMap, VecDeque};

/// Per-tile queues of the tasks that touch the tile and have not completed yet, in emission
/// order.
///
/// A task may start once, for every tile it touches, it is preceded in that tile's queue only by
/// readers, and only if it is itself a reader. That is, a writer must be at the front of the
/// queue, and a reader must have no writer ahead of it.
pub(crate) struct HazardTable {
    queues: HashMap<DataHandle, VecDeque<(TaskId, AccessMode)>>,
}

impl HazardTable {
    pub fn new(tasks: &[Task]) -> Self {
        let mut queues = HashMap::<DataHandle, VecDeque<_>>::new();
        for task in tasks {
            for access in &task.accesses {
                queues
                    .entry(access.handle)
                    .or_default()
                    .push_back((task.id, access.mode));
            }
        }
        Self { queues }
    }

    /// Returns `true` if no earlier uncompleted task conflicts with `task` on any tile.
    pub fn is_ready(&self, task: &Task) -> bool {
        task.accesses.iter().all(|access| {
            let Some(queue) = self.queues.get(&access.handle) else {
                return false;
            };
            for &(id, mode) in queue {
                if id == task.id {
                    return true;
                }
                if access.mode == AccessMode::Write || mode == AccessMode::Write {
                    return false;
                }
            }
            false
        })
    }

    /// Removes a completed task from its queues, and returns the tasks whose readiness may have
    /// changed.
    pub fn retire(&mut self, task: &Task) -> Vec<TaskId> {
        let mut candidates = Vec::new();
        for access in &task.accesses {
            let Some(queue) = self.queues.get_mut(&access.handle) else {
                continue;
            };
            if let Some(pos) = queue.iter().position(|&(id, _)| id == task.id) {
                queue.remove(pos);
            }
            // the leading readers and the first writer are the only tasks that can be unblocked
            for &(id, mode) in queue.iter() {
                candidates.push(id);
                if mode == AccessMode::Write {
                    break;
                }
            }
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert,
        linalg::qr::tiled::graph::TaskGraph,
        tile::TileLayout,
    };

    #[test]
    fn readers_run_together_writers_alone() {
        let g = TaskGraph::build(&TileLayout::new(6, 6, 6, 2).unwrap());
        let tasks = g.tasks();
        let mut table = HazardTable::new(tasks);

        let ready = |table: &HazardTable| -> Vec<usize> {
            tasks.iter().filter(|t| table.is_ready(t)).map(|t| t.id.0).collect()
        };
        // only the first panel factorization
        assert!(ready(&table) == [0]);

        // both panel updates read A(0, 0) and T(0, 0), and write distinct tiles
        let candidates = table.retire(&tasks[0]);
        assert!(candidates.contains(&TaskId(1)));
        assert!(ready(&table) == [1, 2]);

        table.retire(&tasks[2]);
        // the elimination of A(1, 0) writes A(0, 0) and must wait for the remaining reader
        assert!(ready(&table) == [1]);
        table.retire(&tasks[1]);
        assert!(ready(&table) == [3]);
    }
}
