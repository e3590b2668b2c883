//! Path generation
//!
//! A diagnostic path is built from the shortest chain of predecessors
//! between the error node and a root of the exploded graph. [`PathWalk`]
//! yields the edges of that chain from the error node backwards; for every
//! edge the builder may add:
//!
//! - a control-flow piece when the edge leaves a block ("Taking true
//!   branch", "Loop condition is false.  Execution continues on line 7")
//! - events from the report's visitors ("Assuming 'p' is null")
//! - the boundary of an inlined call ("Returning from 'f'", "Calling 'f'")
//!
//! Pieces are collected in reverse and flipped once the root is reached.
//! Consecutive pieces at the use of a macro are then grouped into a macro
//! piece.

use super::bug_reporter::{BugReport, BugReporterVisitor, PathContext};
use super::diagnostic::{
    CallPiece, ControlEdge, ControlFlowPiece, EventPiece, IssueContext, MacroPiece, PathDiagnostic, PathPiece,
};
use crate::cfg::{BranchKind, CfgElement, ExprId, ExprKind, JumpKind, LoopKind, Program, Terminator, UnaryOp};
use crate::config::PathScheme;
use crate::engine::{block_start, terminator_range, ExplodedGraph, NodeId, PointKind};
use crate::frontend::ast::{BinOp, MacroExpansion, SourceRange};
use crate::memory::RegionId;
use crate::svals::{Loc, SVal};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Breadth-first search for the shortest chain of predecessors from a node
/// without predecessors to `node`, returned root first.
pub fn shortest_path(graph: &ExplodedGraph, node: NodeId) -> Option<Vec<NodeId>> {
    let mut parent: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut queue = VecDeque::from([node]);
    let mut root = None;
    while let Some(current) = queue.pop_front() {
        let preds = &graph.node(current).preds;
        if preds.is_empty() {
            root = Some(current);
            break;
        }
        for pred in preds {
            if *pred != node && !parent.contains_key(pred) {
                parent.insert(*pred, current);
                queue.push_back(*pred);
            }
        }
    }

    let mut path = vec![root?];
    while let Some(next) = parent.get(path.last()?) {
        path.push(*next);
    }
    (path.last() == Some(&node)).then_some(path)
}

/// Edges of a path from its last node back to its first, as
/// `(pred, succ)` pairs.
///
/// The graph does not change once built, so a walk can be restarted by
/// creating a new one over the same path.
#[derive(Debug, Clone)]
pub struct PathWalk<'n> {
    path: &'n [NodeId],
    succ: usize,
}

impl<'n> PathWalk<'n> {
    pub fn new(path: &'n [NodeId]) -> Self {
        Self {
            path,
            succ: path.len().saturating_sub(1),
        }
    }
}

impl Iterator for PathWalk<'_> {
    type Item = (NodeId, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        if self.succ == 0 {
            return None;
        }
        let edge = (self.path[self.succ - 1], self.path[self.succ]);
        self.succ -= 1;
        Some(edge)
    }
}

/// Caller-side pieces saved while the body of a call is collected
struct PendingCall {
    outer: Vec<PathPiece>,
    call_exit: EventPiece,
}

struct PathBuilder<'c, 'g, 'a, 'p> {
    ctx: &'c PathContext<'g, 'a, 'p>,
    scheme: PathScheme,
    /// Pieces of the innermost open call, last piece first
    current: Vec<PathPiece>,
    calls: Vec<PendingCall>,
}

impl PathBuilder<'_, '_, '_, '_> {
    fn push(&mut self, piece: PathPiece) {
        self.current.push(piece);
    }

    fn close_body(&mut self) -> Vec<PathPiece> {
        let mut body = std::mem::take(&mut self.current);
        body.reverse();
        body
    }

    /// Going backwards, leaving the caller at a `CallExit` opens the callee.
    fn enter_callee(&mut self, pred: NodeId) {
        let ctx = self.ctx;
        let node = ctx.graph.node(pred);
        let PointKind::CallExit { site } = node.point.kind else { return };
        let callee = ctx.function_name(node.point.frame).unwrap_or("function");
        let call_exit = EventPiece::new(
            ctx.program.expr(site.expr).location(),
            format!("Returning from '{}'", callee),
        );
        let outer = std::mem::take(&mut self.current);
        self.calls.push(PendingCall { outer, call_exit });
    }

    /// Going backwards, the `CallEnter` closes the body of the callee.
    fn leave_callee(&mut self, pred: NodeId, succ: NodeId) {
        let ctx = self.ctx;
        let enter = ctx.graph.node(pred);
        let PointKind::CallEnter { site, callee } = enter.point.kind else { return };
        let callee_decl = ctx.program.function(callee);
        let caller = ctx.function_name(enter.point.frame).unwrap_or("function");
        let call_site = ctx.program.expr(site.expr).location();
        let entered_at = ctx.node_location(succ).unwrap_or(callee_decl.location);

        let call_enter = EventPiece::new(call_site, format!("Calling '{}'", callee_decl.name));
        let within = EventPiece::new(entered_at, format!("Entered call from '{}'", caller));
        let body = self.close_body();
        let call_exit = match self.calls.pop() {
            Some(pending) => {
                self.current = pending.outer;
                Some(pending.call_exit)
            }
            // the report is inside this call
            None => None,
        };
        self.push(PathPiece::Call(CallPiece {
            call_enter: Some(call_enter),
            call_enter_within_caller: Some(within),
            path: body,
            call_exit,
            call_site,
        }));
    }

    fn finish(mut self) -> Vec<PathPiece> {
        while let Some(pending) = self.calls.pop() {
            let body = self.close_body();
            let call_site = pending.call_exit.location;
            self.current = pending.outer;
            self.push(PathPiece::Call(CallPiece {
                call_enter: None,
                call_enter_within_caller: None,
                path: body,
                call_exit: Some(pending.call_exit),
                call_site,
            }));
        }
        let mut path = self.current;
        path.reverse();
        path
    }

    /// Control-flow piece for the edge into `succ`, if it is a block edge.
    fn control_piece(&self, succ: NodeId) -> Option<ControlFlowPiece> {
        let ctx = self.ctx;
        let program = ctx.program;
        let node = ctx.graph.node(succ);
        let PointKind::BlockEdge { src, dst } = node.point.kind else { return None };
        let function = program.function(ctx.frames.frame(node.point.frame)?.function);
        let cfg = &function.body.as_ref()?.cfg;
        let src_block = cfg.block(src)?;
        let dst_block = cfg.block(dst)?;

        let end = block_start(program, dst_block).unwrap_or(SourceRange::point(function.end_location));
        let start = terminator_range(program, src_block)
            .or_else(|| src_block.elements.last().map(|e| program.element_range(e)))
            .unwrap_or(end);
        let line = end.begin.line;

        let message = match &src_block.terminator {
            Terminator::Branch {
                then_block, kind, ..
            } => {
                let taken = dst == *then_block;
                match kind {
                    BranchKind::If => format!("Taking {} branch", if taken { "true" } else { "false" }),
                    BranchKind::Loop(LoopKind::DoWhile) if taken => {
                        format!("Loop condition is true.  Execution continues on line {}", line)
                    }
                    BranchKind::Loop(_) if taken => "Loop condition is true.  Entering loop body".to_string(),
                    BranchKind::Loop(_) => format!("Loop condition is false.  Execution continues on line {}", line),
                    BranchKind::LogicalAnd => format!("Left side of '&&' is {}", taken),
                    BranchKind::LogicalOr => format!("Left side of '||' is {}", taken),
                    BranchKind::Conditional => format!("'?' condition is {}", taken),
                    BranchKind::Operand => String::new(),
                }
            }
            Terminator::Switch {
                cases,
                default,
                default_location,
                ..
            } => match cases.iter().find(|case| case.block == dst) {
                Some(case) => format!("Control jumps to 'case {}:' at line {}", case.value, case.location.line),
                None if dst == *default => match default_location {
                    Some(label) => format!("Control jumps to the 'default' case at line {}", label.line),
                    None => format!("'Default' branch taken. Execution continues on line {}", line),
                },
                None => String::new(),
            },
            Terminator::Goto { kind, .. } => match kind {
                JumpKind::Goto | JumpKind::Break | JumpKind::Continue => format!("Control jumps to line {}", line),
                JumpKind::Fallthrough | JumpKind::Return => String::new(),
            },
            Terminator::Exit => return None,
        };

        if message.is_empty() && self.scheme == PathScheme::Minimal {
            return None;
        }
        Some(ControlFlowPiece {
            edges: vec![ControlEdge { start, end }],
            message,
        })
    }
}

/// Build the diagnostic for `report` along `path` (root first).
pub fn generate_path_diagnostic(
    ctx: &PathContext<'_, '_, '_>,
    report: &mut BugReport,
    path: &[NodeId],
    scheme: PathScheme,
) -> PathDiagnostic {
    let mut visitors = report.take_visitors();
    visitors.push(Box::new(ConditionVisitor));
    visitors.push(Box::new(StoreVisitor::default()));

    let mut builder = PathBuilder {
        ctx,
        scheme,
        current: Vec::new(),
        calls: Vec::new(),
    };
    let mut last = EventPiece::new(report.location, report.description.clone());
    last.ranges = report.ranges.clone();
    builder.push(PathPiece::Event(last));

    for (pred, succ) in PathWalk::new(path) {
        let events: Vec<EventPiece> = visitors
            .iter_mut()
            .filter_map(|visitor| visitor.visit_node(succ, pred, ctx, report))
            .collect();
        match ctx.graph.node(pred).point.kind {
            PointKind::CallExit { .. } => {
                builder.current.extend(events.into_iter().map(PathPiece::Event));
                builder.enter_callee(pred);
            }
            PointKind::CallEnter { .. } => {
                builder.current.extend(events.into_iter().map(PathPiece::Event));
                builder.leave_callee(pred, succ);
            }
            _ => {
                if let Some(control) = builder.control_piece(succ) {
                    builder.push(PathPiece::ControlFlow(control));
                }
                builder.current.extend(events.into_iter().map(PathPiece::Event));
            }
        }
    }

    let pieces = group_macros(builder.finish(), &ctx.program.macro_expansions);
    let error_frame = ctx.graph.node(report.node).point.frame;
    PathDiagnostic {
        file: ctx.program.file_name.clone(),
        bug_type: report.bug_type.name.to_string(),
        category: report.bug_type.category.to_string(),
        description: report.description.clone(),
        location: report.location,
        issue_context: ctx.function_name(error_frame).map(|name| IssueContext {
            kind: "function".to_string(),
            name: name.to_string(),
        }),
        path: pieces,
    }
}

/// Group runs of pieces located at one macro use.
fn group_macros(pieces: Vec<PathPiece>, expansions: &[MacroExpansion]) -> Vec<PathPiece> {
    if expansions.is_empty() {
        return pieces;
    }
    let mut grouped: Vec<PathPiece> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let piece = match piece {
            PathPiece::Call(mut call) => {
                call.path = group_macros(call.path, expansions);
                PathPiece::Call(call)
            }
            other => other,
        };
        let expansion = match &piece {
            PathPiece::Call(_) => None,
            other => expansions.iter().find(|e| e.location == other.location()),
        };
        match (expansion, grouped.last_mut()) {
            (Some(expansion), Some(PathPiece::Macro(group))) if group.location == expansion.location => {
                group.sub_pieces.push(piece);
            }
            (Some(expansion), _) => grouped.push(PathPiece::Macro(MacroPiece {
                name: expansion.name.clone(),
                location: expansion.location,
                sub_pieces: vec![piece],
            })),
            (None, _) => grouped.push(piece),
        }
    }
    grouped
}

// ===== Built-in visitors =====

/// Explains the assumptions made when a branch narrowed the constraints.
pub struct ConditionVisitor;

impl BugReporterVisitor for ConditionVisitor {
    fn visit_node(
        &mut self,
        succ: NodeId,
        pred: NodeId,
        ctx: &PathContext<'_, '_, '_>,
        _report: &BugReport,
    ) -> Option<EventPiece> {
        let node = ctx.graph.node(succ);
        let PointKind::BlockEdge { src, dst } = node.point.kind else { return None };
        if node.state.constraints == ctx.graph.node(pred).state.constraints {
            return None;
        }
        let function = ctx.program.function(ctx.frames.frame(node.point.frame)?.function);
        let block = function.body.as_ref()?.cfg.block(src)?;
        let Terminator::Branch { cond, then_block, .. } = &block.terminator else { return None };
        let range = ctx.program.expr(*cond).range;
        let message = describe_assumption(ctx.program, *cond, dst == *then_block);
        Some(EventPiece::new(range.begin, message).with_range(range))
    }
}

fn strip_casts(program: &Program, mut expr: ExprId) -> ExprId {
    while let ExprKind::Cast { operand } = program.expr(expr).kind {
        expr = operand;
    }
    expr
}

fn is_null_constant(program: &Program, expr: ExprId) -> bool {
    matches!(
        program.expr(strip_casts(program, expr)).kind,
        ExprKind::Null | ExprKind::IntLiteral(0)
    )
}

/// "Assuming 'x' is > 5" for a branch on `cond` going the `taken` way.
pub fn describe_assumption(program: &Program, cond: ExprId, taken: bool) -> String {
    let cond = strip_casts(program, cond);
    let expr = program.expr(cond);
    match &expr.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => describe_assumption(program, *operand, !taken),
        ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
            let Some(op) = (if taken { Some(*op) } else { op.negated() }) else {
                return generic_assumption(taken);
            };
            let lhs_ty = &program.expr(*lhs).ty;
            if lhs_ty.is_pointer() && is_null_constant(program, *rhs) && matches!(op, BinOp::Eq | BinOp::Ne) {
                return pointer_assumption(program.describe_expr(*lhs), op == BinOp::Ne);
            }
            match (program.describe_expr(*lhs), program.describe_expr(*rhs)) {
                (Some(name), Some(value)) => {
                    let relation = match op {
                        BinOp::Eq => "equal to".to_string(),
                        BinOp::Ne => "not equal to".to_string(),
                        other => other.symbol().to_string(),
                    };
                    format!("Assuming '{}' is {} {}", name, relation, value)
                }
                _ => generic_assumption(taken),
            }
        }
        _ if expr.ty.is_pointer() => pointer_assumption(program.describe_expr(cond), taken),
        _ => match program.describe_expr(cond) {
            Some(name) if taken => format!("Assuming '{}' is not equal to 0", name),
            Some(name) => format!("Assuming '{}' is 0", name),
            None => generic_assumption(taken),
        },
    }
}

fn pointer_assumption(name: Option<String>, non_null: bool) -> String {
    let outcome = if non_null { "non-null" } else { "null" };
    match name {
        Some(name) => format!("Assuming '{}' is {}", name, outcome),
        None => format!("Assuming pointer value is {}", outcome),
    }
}

fn generic_assumption(taken: bool) -> String {
    format!("Assuming the condition is {}", taken)
}

/// Explains the last store to every interesting region.
#[derive(Default)]
pub struct StoreVisitor {
    explained: Vec<RegionId>,
}

impl BugReporterVisitor for StoreVisitor {
    fn visit_node(
        &mut self,
        succ: NodeId,
        pred: NodeId,
        ctx: &PathContext<'_, '_, '_>,
        report: &BugReport,
    ) -> Option<EventPiece> {
        let node = ctx.graph.node(succ);
        let PointKind::PostStmt { block, index } = node.point.kind else { return None };
        if node.point.tag.is_some() {
            return None;
        }
        let function = ctx.program.function(ctx.frames.frame(node.point.frame)?.function);
        let element = function.body.as_ref()?.cfg.block(block)?.elements.get(index as usize)?;
        let regions = ctx.states.regions();
        let before = &ctx.graph.node(pred).state.store;

        for &region in report.interesting_regions() {
            if self.explained.contains(&region) {
                continue;
            }
            let after = node.state.store.direct(region);
            let message = match element {
                CfgElement::Decl { var, init, location } => {
                    if regions.var_region(*var, node.point.frame) != region {
                        continue;
                    }
                    let name = &ctx.program.var(*var).name;
                    let text = match (init, after) {
                        (None, _) => format!("Variable '{}' declared without an initial value", name),
                        (Some(_), Some(value)) => initialized_message(name, value),
                        (Some(_), None) => format!("Variable '{}' initialized here", name),
                    };
                    Some((*location, text))
                }
                CfgElement::Expr { expr, .. } => {
                    if after == before.direct(region) || after.is_none() {
                        continue;
                    }
                    let is_store = matches!(
                        ctx.program.expr(*expr).kind,
                        ExprKind::Assign { .. } | ExprKind::CompoundAssign { .. } | ExprKind::IncDec { .. }
                    );
                    if !is_store {
                        continue;
                    }
                    let Some(name) = regions.describe(region) else { continue };
                    after.map(|value| (ctx.program.expr(*expr).location(), assigned_message(&name, value)))
                }
                _ => None,
            };
            if let Some((location, text)) = message {
                self.explained.push(region);
                return Some(EventPiece::new(location, text));
            }
        }
        None
    }
}

fn initialized_message(name: &str, value: &SVal) -> String {
    match value {
        SVal::Loc(Loc::ConcreteInt(0)) => format!("Variable '{}' initialized to a null pointer value", name),
        SVal::Undefined => format!("Variable '{}' initialized to a garbage value", name),
        value => match value.as_concrete_int() {
            Some(n) => format!("Variable '{}' initialized to {}", name, n),
            None => format!("Variable '{}' initialized here", name),
        },
    }
}

fn assigned_message(name: &str, value: &SVal) -> String {
    match value {
        SVal::Loc(Loc::ConcreteInt(0)) => format!("Null pointer value stored to '{}'", name),
        SVal::Undefined => format!("Uninitialized value stored to '{}'", name),
        value => match value.as_concrete_int() {
            Some(n) => format!("The value {} is assigned to '{}'", n, name),
            None => format!("Value assigned to '{}'", name),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_program;
    use crate::engine::ProgramPoint;
    use crate::frontend::parse_source;
    use crate::memory::MemRegionManager;
    use crate::state::ProgramStateManager;
    use crate::store::RegionStoreManager;
    use crate::svals::SymbolManager;
    use test_log::test;

    fn branch_condition(program: &Program, function: &str) -> ExprId {
        let id = program.function_by_name(function).unwrap();
        let cfg = &program.function(id).body.as_ref().unwrap().cfg;
        cfg.blocks
            .iter()
            .find_map(|b| match &b.terminator {
                Terminator::Branch { cond, .. } => Some(*cond),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_assumption_messages() {
        let source = "void a(int *p) { if (p) {} }\n\
                      void b(int *p) { if (p == 0) {} }\n\
                      void c(int x) { if (x > 5) {} }\n\
                      void d(int x) { if (!x) {} }\n\
                      void e(int x) { if (x == 3) {} }";
        let program = build_program(&parse_source(source).unwrap(), "test.c").unwrap();

        let a = branch_condition(&program, "a");
        assert_eq!(describe_assumption(&program, a, true), "Assuming 'p' is non-null");
        assert_eq!(describe_assumption(&program, a, false), "Assuming 'p' is null");
        let b = branch_condition(&program, "b");
        assert_eq!(describe_assumption(&program, b, true), "Assuming 'p' is null");
        let c = branch_condition(&program, "c");
        assert_eq!(describe_assumption(&program, c, true), "Assuming 'x' is > 5");
        assert_eq!(describe_assumption(&program, c, false), "Assuming 'x' is <= 5");
        let d = branch_condition(&program, "d");
        assert_eq!(describe_assumption(&program, d, true), "Assuming 'x' is 0");
        let e = branch_condition(&program, "e");
        assert_eq!(describe_assumption(&program, e, false), "Assuming 'x' is not equal to 3");
    }

    #[test]
    fn test_shortest_path_and_walk() {
        let program = Program::default();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let states = ProgramStateManager::new(&regions, &symbols, Box::new(RegionStoreManager::new()));
        let state = states.initial_state();
        let frame = crate::cfg::FrameId(0);
        let at = |n: u32| {
            ProgramPoint::new(
                PointKind::BlockEntrance {
                    block: crate::cfg::BlockId(n),
                },
                frame,
            )
        };

        // 0 -> 1 -> 2 -> 4 and 0 -> 3 -> 4
        let mut graph = ExplodedGraph::new();
        let nodes: Vec<NodeId> = (0..5).map(|n| graph.get_node(at(n), state.clone(), false).0).collect();
        graph.add_root(nodes[0]);
        for (a, b) in [(0, 1), (1, 2), (2, 4), (0, 3), (3, 4)] {
            graph.add_edge(nodes[a], nodes[b]);
        }

        let path = shortest_path(&graph, nodes[4]).unwrap();
        assert_eq!(path, vec![nodes[0], nodes[3], nodes[4]]);
        let edges: Vec<_> = PathWalk::new(&path).collect();
        assert_eq!(edges, vec![(nodes[3], nodes[4]), (nodes[0], nodes[3])]);
        // walks restart from the same path
        assert_eq!(PathWalk::new(&path).count(), 2);
        assert_eq!(shortest_path(&graph, nodes[0]), Some(vec![nodes[0]]));
    }

    #[test]
    fn test_macro_pieces_group_consecutive_events() {
        use crate::frontend::ast::SourceLocation;
        let at_macro = SourceLocation::new(4, 3);
        let expansions = vec![MacroExpansion {
            name: "CHECK".to_string(),
            location: at_macro,
        }];
        let pieces = vec![
            PathPiece::Event(EventPiece::new(SourceLocation::new(2, 1), "before")),
            PathPiece::Event(EventPiece::new(at_macro, "first")),
            PathPiece::Event(EventPiece::new(at_macro, "second")),
            PathPiece::Event(EventPiece::new(SourceLocation::new(5, 1), "after")),
        ];
        let grouped = group_macros(pieces, &expansions);
        assert_eq!(grouped.len(), 3);
        match &grouped[1] {
            PathPiece::Macro(group) => {
                assert_eq!(group.name, "CHECK");
                assert_eq!(group.sub_pieces.len(), 2);
            }
            other => panic!("expected a macro piece, got {:?}", other),
        }
    }
}
