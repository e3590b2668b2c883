// Pending nodes of the exploded graph, with the per-path block counts

use super::graph::NodeId;
use crate::cfg::{BlockId, FrameId};
use crate::config::WorkListKind;
use crate::store::PersistentMap;
use std::collections::VecDeque;

/// How often the path leading to a node entered each block
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BlockCounter {
    counts: PersistentMap<(FrameId, BlockId), u32>,
}

impl BlockCounter {
    pub fn get(&self, frame: FrameId, block: BlockId) -> u32 {
        self.counts.get(&(frame, block)).copied().unwrap_or(0)
    }

    pub fn increment(&self, frame: FrameId, block: BlockId) -> BlockCounter {
        BlockCounter {
            counts: self.counts.insert((frame, block), self.get(frame, block) + 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkListUnit {
    pub node: NodeId,
    pub block_counter: BlockCounter,
}

#[derive(Debug)]
pub enum WorkList {
    /// Finish one path before starting the next
    Dfs(Vec<WorkListUnit>),
    /// Advance all paths in lock step
    Bfs(VecDeque<WorkListUnit>),
}

impl WorkList {
    pub fn new(kind: WorkListKind) -> Self {
        match kind {
            WorkListKind::Dfs => WorkList::Dfs(Vec::new()),
            WorkListKind::Bfs => WorkList::Bfs(VecDeque::new()),
        }
    }

    pub fn push(&mut self, unit: WorkListUnit) {
        match self {
            WorkList::Dfs(stack) => stack.push(unit),
            WorkList::Bfs(queue) => queue.push_back(unit),
        }
    }

    pub fn pop(&mut self) -> Option<WorkListUnit> {
        match self {
            WorkList::Dfs(stack) => stack.pop(),
            WorkList::Bfs(queue) => queue.pop_front(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WorkList::Dfs(stack) => stack.len(),
            WorkList::Bfs(queue) => queue.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            WorkList::Dfs(stack) => stack.clear(),
            WorkList::Bfs(queue) => queue.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(n: u32) -> WorkListUnit {
        WorkListUnit {
            node: NodeId(n),
            block_counter: BlockCounter::default(),
        }
    }

    #[test]
    fn test_pop_order() {
        let mut dfs = WorkList::new(WorkListKind::Dfs);
        let mut bfs = WorkList::new(WorkListKind::Bfs);
        for n in 0..3 {
            dfs.push(unit(n));
            bfs.push(unit(n));
        }
        assert_eq!(dfs.pop().map(|u| u.node), Some(NodeId(2)));
        assert_eq!(bfs.pop().map(|u| u.node), Some(NodeId(0)));
        assert_eq!(dfs.len(), 2);
    }

    #[test]
    fn test_counters_are_per_path() {
        let start = BlockCounter::default();
        let once = start.increment(FrameId(0), BlockId(3));
        let twice = once.increment(FrameId(0), BlockId(3));
        assert_eq!(start.get(FrameId(0), BlockId(3)), 0);
        assert_eq!(once.get(FrameId(0), BlockId(3)), 1);
        assert_eq!(twice.get(FrameId(0), BlockId(3)), 2);
        assert_eq!(twice.get(FrameId(1), BlockId(3)), 0);
    }
}
