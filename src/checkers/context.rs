// What a checker callback can see and do at one node

use crate::cfg::{ExprId, FrameId, LocationContextManager, Program};
use crate::engine::{ExplodedGraph, NodeId, ProgramPoint};
use crate::frontend::ast::SourceLocation;
use crate::report::{BugReport, BugReporter};
use crate::state::{ProgramStateManager, ProgramStateRef};
use crate::svals::SVal;

/// Access to the current node for one checker callback.
///
/// New nodes are placed at the callback's program point, tagged with the
/// checker's name. A callback that adds no transition leaves the path as
/// it was; one that only generates a sink ends it.
pub struct CheckerContext<'c, 'a, 'p> {
    program: &'p Program,
    frames: &'c LocationContextManager,
    states: &'c ProgramStateManager<'a, 'p>,
    graph: &'c mut ExplodedGraph,
    reporter: &'c mut BugReporter,
    pred: NodeId,
    point: ProgramPoint,
    block_count: u32,
    produced: Vec<NodeId>,
    transitioned: bool,
}

impl<'c, 'a, 'p> CheckerContext<'c, 'a, 'p> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        program: &'p Program,
        frames: &'c LocationContextManager,
        states: &'c ProgramStateManager<'a, 'p>,
        graph: &'c mut ExplodedGraph,
        reporter: &'c mut BugReporter,
        pred: NodeId,
        point: ProgramPoint,
        block_count: u32,
    ) -> Self {
        Self {
            program,
            frames,
            states,
            graph,
            reporter,
            pred,
            point,
            block_count,
            produced: Vec::new(),
            transitioned: false,
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn frames(&self) -> &'c LocationContextManager {
        self.frames
    }

    pub fn states(&self) -> &'c ProgramStateManager<'a, 'p> {
        self.states
    }

    pub fn state(&self) -> ProgramStateRef {
        self.graph.node(self.pred).state.clone()
    }

    pub fn predecessor(&self) -> NodeId {
        self.pred
    }

    pub fn frame(&self) -> FrameId {
        self.point.frame
    }

    /// Times the current path entered the current block.
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Value of an already evaluated expression of the current frame.
    pub fn expr_value(&self, expr: ExprId) -> SVal {
        self.states.expr_value(&self.state(), self.point.frame, expr)
    }

    pub fn location(&self) -> Option<SourceLocation> {
        self.point.location(self.program, self.frames)
    }

    /// Continue the path with `state`. An unchanged state continues from
    /// the predecessor without a new node.
    pub fn add_transition(&mut self, state: ProgramStateRef) -> NodeId {
        self.transitioned = true;
        let node = if state == self.graph.node(self.pred).state {
            self.pred
        } else {
            let (node, _) = self.graph.get_node(self.point, state, false);
            self.graph.add_edge(self.pred, node);
            node
        };
        if !self.produced.contains(&node) {
            self.produced.push(node);
        }
        node
    }

    /// End the path at a node with `state`.
    pub fn generate_sink(&mut self, state: ProgramStateRef) -> NodeId {
        self.transitioned = true;
        let (node, _) = self.graph.get_node(self.point, state, true);
        self.graph.add_edge(self.pred, node);
        node
    }

    /// A node a report can point at while the path goes on.
    pub fn generate_error_node(&mut self, state: ProgramStateRef) -> NodeId {
        self.transitioned = true;
        let (node, _) = self.graph.get_node(self.point, state, false);
        self.graph.add_edge(self.pred, node);
        if !self.produced.contains(&node) {
            self.produced.push(node);
        }
        node
    }

    pub fn emit_report(&mut self, report: BugReport) {
        self.reporter.emit_report(report);
    }

    /// Nodes the path continues from.
    pub(crate) fn finish(self) -> Vec<NodeId> {
        if self.transitioned {
            self.produced
        } else {
            vec![self.pred]
        }
    }
}
