//! The exploded graph
//!
//! Nodes pair a [`ProgramPoint`] with a [`ProgramStateRef`]. Asking for a
//! node that already exists returns the existing one, so paths that reach
//! the same point in the same state merge and the graph is a DAG rather
//! than a tree of paths.
//!
//! ```text
//!   entry ── B1 ──┬── then ──┐
//!                 └── else ──┴── return      (merged when states agree)
//! ```
//!
//! Sinks end a path: the engine never computes their successors.

use super::program_point::ProgramPoint;
use crate::state::ProgramStateRef;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct ExplodedNode {
    pub point: ProgramPoint,
    pub state: ProgramStateRef,
    pub preds: Vec<NodeId>,
    pub succs: Vec<NodeId>,
    pub sink: bool,
}

#[derive(Debug, Default)]
pub struct ExplodedGraph {
    nodes: Vec<ExplodedNode>,
    index: FxHashMap<(ProgramPoint, ProgramStateRef, bool), NodeId>,
    roots: Vec<NodeId>,
}

impl ExplodedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node for `(point, state)`, and whether it was just created.
    pub fn get_node(&mut self, point: ProgramPoint, state: ProgramStateRef, sink: bool) -> (NodeId, bool) {
        let key = (point, state, sink);
        if let Some(id) = self.index.get(&key) {
            return (*id, false);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ExplodedNode {
            point,
            state: key.1.clone(),
            preds: Vec::new(),
            succs: Vec::new(),
            sink,
        });
        self.index.insert(key, id);
        (id, true)
    }

    pub fn add_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub fn add_edge(&mut self, pred: NodeId, succ: NodeId) {
        if pred == succ || self.nodes[succ.index()].preds.contains(&pred) {
            return;
        }
        self.nodes[succ.index()].preds.push(pred);
        self.nodes[pred.index()].succs.push(succ);
    }

    pub fn node(&self, id: NodeId) -> &ExplodedNode {
        &self.nodes[id.index()]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ExplodedNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Nodes at `point`, ignoring checker tags.
    pub fn nodes_at(&self, point: ProgramPoint) -> Vec<NodeId> {
        let point = point.untagged();
        self.iter()
            .filter(|(_, node)| node.point.untagged() == point)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{BlockId, FrameId, Program};
    use crate::engine::PointKind;
    use crate::memory::{MemRegionManager, RegionId};
    use crate::state::{ProgramState, ProgramStateManager};
    use crate::store::{BindingKey, RegionStoreManager, Store};
    use crate::svals::{SVal, SymbolManager};

    #[test]
    fn test_equal_nodes_merge() {
        let program = Program::default();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let states = ProgramStateManager::new(&regions, &symbols, Box::new(RegionStoreManager::new()));
        let a = states.initial_state();
        let b = states.intern(ProgramState {
            store: Store::new().insert(BindingKey::direct(RegionId(0)), SVal::int(1)),
            ..ProgramState::default()
        });

        let mut graph = ExplodedGraph::new();
        let entry = ProgramPoint::new(PointKind::FunctionEntry, FrameId(0));
        let join = ProgramPoint::new(PointKind::BlockEntrance { block: BlockId(2) }, FrameId(0));

        let (root, _) = graph.get_node(entry, a.clone(), false);
        graph.add_root(root);
        let (left, new_left) = graph.get_node(join, b.clone(), false);
        let (right, new_right) = graph.get_node(join, b, false);
        assert!(new_left && !new_right);
        assert_eq!(left, right);
        graph.add_edge(root, left);
        graph.add_edge(root, right);
        assert_eq!(graph.node(left).preds, vec![root]);

        let (other, _) = graph.get_node(join, a, false);
        assert_ne!(other, left);
        assert_eq!(graph.nodes_at(join).len(), 2);
        assert_eq!(graph.len(), 3);
    }
}
