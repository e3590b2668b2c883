//! The worklist loop
//!
//! [`ExprEngine::run`] explores one top-level function. Every popped node
//! is stepped according to its [`PointKind`]:
//!
//! - block edges enter blocks: the per-path visit count is checked, dead
//!   bindings are reaped and a `BlockEntrance` node is created
//! - statement points evaluate the next element (see [`transfer`](super::transfer))
//! - terminators split the path on the feasible branch directions
//! - the end of an inlined frame returns to the caller, the end of the
//!   top-level frame ends the path
//!
//! Checker callbacks run around each step. Their nodes carry the checker's
//! name as tag so they never merge with the engine's own nodes.
//!
//! Exploration stops early when the node budget or the timeout runs out;
//! what was found so far is kept and a [`CoverageNote`] records the cut.

use super::graph::{ExplodedGraph, NodeId};
use super::program_point::{block_start, PointKind, ProgramPoint};
use super::transfer::Evaluated;
use super::worklist::{BlockCounter, WorkList, WorkListUnit};
use crate::cfg::{
    BasicBlock, BlockId, Cfg, CfgElement, ConstInit, ExprId, FieldId, FrameId, FunctionDecl, FunctionId,
    LocationContextManager, Program, StackFrame, Terminator,
};
use crate::checkers::{Checker, CheckerContext, CheckerManager};
use crate::config::{AnalyzerOptions, LoopExhaustion};
use crate::frontend::ast::{BinOp, SourceLocation, Type};
use crate::memory::{RegionId, RegionIndex};
use crate::report::{BugReporter, PathContext, PathDiagnostic};
use crate::state::{ProgramStateManager, ProgramStateRef, SymbolReaper};
use crate::store::Invalidation;
use crate::svals::{Loc, SVal};
use log::{debug, trace, warn};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

// ===== Errors and coverage =====

/// Inconsistencies between the program and the engine's view of it
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("{location}: function '{function}' has no block {block}")]
    MissingBlock {
        function: String,
        block: BlockId,
        location: SourceLocation,
    },

    #[error("{location}: stack frame #{frame} was never created")]
    MissingFrame { frame: u32, location: SourceLocation },

    #[error("{location}: function '{function}' has no body to analyze")]
    MissingBody { function: String, location: SourceLocation },
}

impl EngineError {
    pub fn location(&self) -> SourceLocation {
        match self {
            EngineError::MissingBlock { location, .. }
            | EngineError::MissingFrame { location, .. }
            | EngineError::MissingBody { location, .. } => *location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverageKind {
    /// A path entered a block more often than `max_block_visits`
    BlockLimit,
    NodeBudget,
    Timeout,
}

impl fmt::Display for CoverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageKind::BlockLimit => write!(f, "block visit limit reached"),
            CoverageKind::NodeBudget => write!(f, "node budget exhausted"),
            CoverageKind::Timeout => write!(f, "timed out"),
        }
    }
}

/// Part of a function the analysis did not explore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageNote {
    pub function: String,
    pub kind: CoverageKind,
    pub location: SourceLocation,
}

impl fmt::Display for CoverageNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: analysis of '{}' is incomplete: {}",
            self.location, self.function, self.kind
        )
    }
}

// ===== Engine =====

/// Symbolic execution of one top-level function
pub struct ExprEngine<'a, 'p> {
    pub(crate) program: &'p Program,
    pub(crate) options: &'a AnalyzerOptions,
    pub(crate) checkers: &'a CheckerManager,
    pub(crate) frames: &'a LocationContextManager,
    pub(crate) states: &'a ProgramStateManager<'a, 'p>,
    pub(crate) graph: ExplodedGraph,
    pub(crate) reporter: BugReporter,
    pub(crate) worklist: WorkList,
    coverage: Vec<CoverageNote>,
}

impl<'a, 'p> ExprEngine<'a, 'p> {
    pub fn new(
        program: &'p Program,
        options: &'a AnalyzerOptions,
        checkers: &'a CheckerManager,
        frames: &'a LocationContextManager,
        states: &'a ProgramStateManager<'a, 'p>,
    ) -> Self {
        Self {
            program,
            options,
            checkers,
            frames,
            states,
            graph: ExplodedGraph::new(),
            reporter: BugReporter::new(),
            worklist: WorkList::new(options.worklist),
            coverage: Vec::new(),
        }
    }

    pub fn graph(&self) -> &ExplodedGraph {
        &self.graph
    }

    pub fn reporter(&self) -> &BugReporter {
        &self.reporter
    }

    pub fn coverage(&self) -> &[CoverageNote] {
        &self.coverage
    }

    pub fn states(&self) -> &'a ProgramStateManager<'a, 'p> {
        self.states
    }

    /// Explore `function` as an entry point until the worklist is empty or
    /// a budget runs out.
    pub fn run(&mut self, function: FunctionId) -> Result<(), EngineError> {
        let program = self.program;
        let decl = program.function(function);
        if decl.body.is_none() {
            return Err(EngineError::MissingBody {
                function: decl.name.clone(),
                location: decl.location,
            });
        }
        let frame = self.frames.top_frame(function);
        debug!("analyzing '{}'", decl.name);

        let state = self.initial_state(decl, frame);
        let (root, _) = self
            .graph
            .get_node(ProgramPoint::new(PointKind::FunctionEntry, frame), state, false);
        self.graph.add_root(root);
        self.worklist.push(WorkListUnit {
            node: root,
            block_counter: BlockCounter::default(),
        });

        let started = Instant::now();
        let deadline = self.options.timeout_ms.map(Duration::from_millis);
        while let Some(unit) = self.worklist.pop() {
            let exhausted = if self.graph.len() >= self.options.max_nodes {
                Some(CoverageKind::NodeBudget)
            } else if deadline.is_some_and(|limit| started.elapsed() > limit) {
                Some(CoverageKind::Timeout)
            } else {
                None
            };
            if let Some(kind) = exhausted {
                warn!(
                    "giving up on '{}' after {} nodes: {}",
                    decl.name,
                    self.graph.len(),
                    kind
                );
                self.note_coverage(frame, kind, decl.location);
                self.worklist.clear();
                break;
            }
            self.dispatch(unit)?;
        }

        debug!(
            "finished '{}': {} nodes, {} reports",
            decl.name,
            self.graph.len(),
            self.reporter.report_count()
        );
        Ok(())
    }

    /// One diagnostic per distinct bug found so far.
    pub fn flush_reports(&mut self) -> Vec<PathDiagnostic> {
        let ctx = PathContext {
            program: self.program,
            graph: &self.graph,
            frames: self.frames,
            states: self.states,
        };
        self.reporter.flush_reports(&ctx, self.options.path_scheme)
    }

    fn dispatch(&mut self, unit: WorkListUnit) -> Result<(), EngineError> {
        let WorkListUnit { node, block_counter } = unit;
        let point = self.graph.node(node).point;
        trace!("visiting node {} at {:?}", node.0, point.kind);

        match point.kind {
            PointKind::FunctionEntry => {
                let entry = self.cfg(point.frame)?.entry;
                self.enter_block(node, entry, point.frame, &block_counter)
            }
            PointKind::BlockEdge { dst, .. } => self.enter_block(node, dst, point.frame, &block_counter),
            PointKind::BlockEntrance { block } => {
                let state = self.state_of(node);
                if self.block(point.frame, block)?.elements.is_empty() {
                    self.process_terminator(node, state, block, point.frame, &block_counter)
                } else {
                    self.process_element(node, state, block, 0, point.frame, &block_counter)
                }
            }
            PointKind::PostStmt { block, index } => self.after_element(node, block, index, point.frame, &block_counter),
            PointKind::CallEnter { site, callee } => {
                let callee_frame = self.frames.callee_frame(point.frame, callee, site);
                let entry = self.cfg(callee_frame)?.entry;
                self.enter_block(node, entry, callee_frame, &block_counter)
            }
            PointKind::EndFunction => self.leave_frame(node, point.frame, &block_counter),
            PointKind::CallExit { site } => self.return_to_caller(node, site, point.frame, &block_counter),
            // never queued
            PointKind::PreStmt { .. } | PointKind::BlockExit { .. } => Ok(()),
        }
    }

    // ===== Lookups =====

    pub(crate) fn state_of(&self, node: NodeId) -> ProgramStateRef {
        self.graph.node(node).state.clone()
    }

    fn stack_frame(&self, frame: FrameId) -> Result<StackFrame, EngineError> {
        self.frames.frame(frame).ok_or(EngineError::MissingFrame {
            frame: frame.0,
            location: SourceLocation::default(),
        })
    }

    pub(crate) fn function_of(&self, frame: FrameId) -> Result<&'p FunctionDecl, EngineError> {
        let program = self.program;
        Ok(program.function(self.stack_frame(frame)?.function))
    }

    pub(crate) fn cfg(&self, frame: FrameId) -> Result<&'p Cfg, EngineError> {
        let decl = self.function_of(frame)?;
        match &decl.body {
            Some(body) => Ok(&body.cfg),
            None => Err(EngineError::MissingBody {
                function: decl.name.clone(),
                location: decl.location,
            }),
        }
    }

    pub(crate) fn block(&self, frame: FrameId, block: BlockId) -> Result<&'p BasicBlock, EngineError> {
        let decl = self.function_of(frame)?;
        self.cfg(frame)?.block(block).ok_or_else(|| EngineError::MissingBlock {
            function: decl.name.clone(),
            block,
            location: decl.location,
        })
    }

    fn note_coverage(&mut self, frame: FrameId, kind: CoverageKind, location: SourceLocation) {
        let top = self.frames.ancestors(frame).last().copied().unwrap_or(frame);
        let function = match self.function_of(top) {
            Ok(decl) => decl.name.clone(),
            Err(_) => return,
        };
        let note = CoverageNote {
            function,
            kind,
            location,
        };
        if !self.coverage.contains(&note) {
            self.coverage.push(note);
        }
    }

    // ===== Nodes and checkers =====

    /// A node holding `state` after `pred`; `pred` itself if the state is
    /// the same.
    pub(crate) fn materialize(&mut self, pred: NodeId, state: ProgramStateRef, point: ProgramPoint) -> NodeId {
        if self.graph.node(pred).state == state {
            return pred;
        }
        let (node, _) = self.graph.get_node(point, state, false);
        self.graph.add_edge(pred, node);
        node
    }

    pub(crate) fn enqueue(&mut self, node: NodeId, counter: &BlockCounter) {
        self.worklist.push(WorkListUnit {
            node,
            block_counter: counter.clone(),
        });
    }

    /// Run one callback of every checker, in registration order, starting
    /// from `preds`. Returns the nodes the paths continue from.
    pub(crate) fn run_checkers<F>(
        &mut self,
        preds: Vec<NodeId>,
        point: ProgramPoint,
        block_count: u32,
        mut callback: F,
    ) -> Vec<NodeId>
    where
        F: FnMut(&dyn Checker, &mut CheckerContext<'_, '_, '_>),
    {
        let checkers = self.checkers;
        let mut current = preds;
        for checker in checkers.iter() {
            let mut next = Vec::with_capacity(current.len());
            for pred in current {
                let mut ctx = CheckerContext::new(
                    self.program,
                    self.frames,
                    self.states,
                    &mut self.graph,
                    &mut self.reporter,
                    pred,
                    point.with_tag(checker.name()),
                    block_count,
                );
                callback(checker, &mut ctx);
                for node in ctx.finish() {
                    if !next.contains(&node) {
                        next.push(node);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    // ===== Blocks =====

    pub(crate) fn enter_block(
        &mut self,
        pred: NodeId,
        dst: BlockId,
        frame: FrameId,
        counter: &BlockCounter,
    ) -> Result<(), EngineError> {
        let states = self.states;
        let block = self.block(frame, dst)?;
        let point = ProgramPoint::new(PointKind::BlockEntrance { block: dst }, frame);
        let visits = counter.get(frame, dst) + 1;
        let limit = self.options.max_block_visits;

        if visits > limit {
            trace!("block {} entered {} times; path stops", dst, visits);
            let state = self.state_of(pred);
            let (sink, _) = self.graph.get_node(point, state, true);
            self.graph.add_edge(pred, sink);
            let location = match block_start(self.program, block) {
                Some(range) => range.begin,
                None => self.function_of(frame)?.location,
            };
            self.note_coverage(frame, CoverageKind::BlockLimit, location);
            return Ok(());
        }
        let widen = visits == limit && block.loop_head && self.options.loop_exhaustion == LoopExhaustion::Widen;
        let counter = counter.increment(frame, dst);

        let reaper = self.live_symbols(&self.state_of(pred), Some(frame), Some(dst));
        let nodes = self.run_checkers(vec![pred], point, visits, |checker, ctx| {
            checker.check_dead_symbols(&reaper, ctx)
        });
        for node in nodes {
            let mut state = self.state_of(node);
            if widen {
                state = self.widen_loop(state, block, frame, visits);
            }
            let state = states.remove_dead(&state, &reaper);
            let (entrance, is_new) = self.graph.get_node(point, state, false);
            self.graph.add_edge(node, entrance);
            if is_new {
                self.enqueue(entrance, &counter);
            }
        }
        Ok(())
    }

    /// Liveness for garbage collection. With a frame, its variables (only
    /// those live at `entering`, if given) and every variable of its
    /// callers are roots; without one, only globals and the environment.
    pub(crate) fn live_symbols(
        &self,
        state: &ProgramStateRef,
        frame: Option<FrameId>,
        entering: Option<BlockId>,
    ) -> SymbolReaper<'a, 'p> {
        let regions = self.states.regions();
        let mut reaper = SymbolReaper::new(regions, self.states.symbols());
        let chain = frame.map(|f| self.frames.ancestors(f)).unwrap_or_default();
        for (depth, current) in chain.into_iter().enumerate() {
            let Ok(decl) = self.function_of(current) else { continue };
            let Some(body) = &decl.body else { continue };
            for &var in decl.params.iter().chain(body.locals.iter()) {
                let live = match entering {
                    Some(block) if depth == 0 => body.liveness.is_live_at_entry(block, var),
                    _ => true,
                };
                if live {
                    reaper.mark_live_region(regions.var_region(var, current));
                }
            }
        }
        reaper.mark_reachable(&state.store, &state.env);
        reaper
    }

    /// Forget what a loop may have changed in the frame and in globals.
    fn widen_loop(&self, state: ProgramStateRef, block: &BasicBlock, frame: FrameId, count: u32) -> ProgramStateRef {
        let Some(expr) = loop_expr(block) else { return state };
        let Ok(decl) = self.function_of(frame) else { return state };
        let regions = self.states.regions();
        let locals = decl.body.iter().flat_map(|body| body.locals.iter());
        let request = Invalidation {
            regions: decl
                .params
                .iter()
                .chain(locals)
                .map(|var| regions.var_region(*var, frame))
                .collect(),
            expr,
            frame,
            count,
            include_globals: true,
        };
        debug!("widening the loop at {} in '{}' after {} passes", block.id, decl.name, count);
        self.states.invalidate_regions(&state, &request).0
    }

    // ===== Elements =====

    pub(crate) fn process_element(
        &mut self,
        pred: NodeId,
        state: ProgramStateRef,
        block: BlockId,
        index: u32,
        frame: FrameId,
        counter: &BlockCounter,
    ) -> Result<(), EngineError> {
        let basic_block = self.block(frame, block)?;
        let Some(element) = basic_block.elements.get(index as usize) else {
            return self.process_terminator(pred, state, block, frame, counter);
        };
        let count = counter.get(frame, block);
        let pre = ProgramPoint::new(PointKind::PreStmt { block, index }, frame);
        let pred = self.materialize(pred, state, pre);

        let nodes = self.run_checkers(vec![pred], pre, count, |checker, ctx| checker.check_pre_stmt(element, ctx));
        for node in nodes {
            for outcome in self.transfer(node, element, pre, counter)? {
                self.finish_element(outcome, element, block, index, frame, counter);
            }
        }
        Ok(())
    }

    /// Record the evaluated element and run the post callbacks.
    pub(crate) fn finish_element(
        &mut self,
        outcome: Evaluated,
        element: &CfgElement,
        block: BlockId,
        index: u32,
        frame: FrameId,
        counter: &BlockCounter,
    ) {
        let Evaluated { pred, state, call } = outcome;
        let post = ProgramPoint::new(PointKind::PostStmt { block, index }, frame);
        let (node, is_new) = self.graph.get_node(post, state, false);
        self.graph.add_edge(pred, node);
        if !is_new {
            return;
        }

        let count = counter.get(frame, block);
        let mut nodes = vec![node];
        if let Some(call) = &call {
            nodes = self.run_checkers(nodes, post, count, |checker, ctx| checker.check_post_call(call, ctx));
        }
        nodes = self.run_checkers(nodes, post, count, |checker, ctx| checker.check_post_stmt(element, ctx));
        for node in nodes {
            self.enqueue(node, counter);
        }
    }

    fn after_element(
        &mut self,
        node: NodeId,
        block: BlockId,
        index: u32,
        frame: FrameId,
        counter: &BlockCounter,
    ) -> Result<(), EngineError> {
        let elements = &self.block(frame, block)?.elements;
        let mut state = self.state_of(node);
        if elements.get(index as usize).is_some_and(CfgElement::is_root) {
            state = self.states.clear_expressions(&state, frame);
        }
        let next = index + 1;
        if (next as usize) < elements.len() {
            self.process_element(node, state, block, next, frame, counter)
        } else {
            self.process_terminator(node, state, block, frame, counter)
        }
    }

    // ===== Terminators =====

    fn process_terminator(
        &mut self,
        pred: NodeId,
        state: ProgramStateRef,
        block: BlockId,
        frame: FrameId,
        counter: &BlockCounter,
    ) -> Result<(), EngineError> {
        let program = self.program;
        let states = self.states;
        let terminator = &self.block(frame, block)?.terminator;
        let count = counter.get(frame, block);
        let exit = ProgramPoint::new(PointKind::BlockExit { block }, frame);

        match terminator {
            Terminator::Goto { target, .. } => {
                self.add_block_edge(pred, state, block, *target, frame, counter);
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
                ..
            } => {
                let cond = *cond;
                let pred = self.materialize(pred, state, exit);
                let nodes = self.run_checkers(vec![pred], exit, count, |checker, ctx| {
                    checker.check_branch_condition(cond, ctx)
                });
                for node in nodes {
                    let state = self.state_of(node);
                    let value = states.expr_value(&state, frame, cond);
                    let (taken, not_taken) = if value.is_unknown_or_undef() {
                        (Some(state.clone()), Some(state))
                    } else {
                        states.assume_dual(&state, &value)
                    };
                    if taken.is_none() || not_taken.is_none() {
                        trace!("branch at {} has one feasible direction", block);
                    }
                    if let Some(state) = taken {
                        self.add_block_edge(node, state, block, *then_block, frame, counter);
                    }
                    if let Some(state) = not_taken {
                        self.add_block_edge(node, state, block, *else_block, frame, counter);
                    }
                }
            }
            Terminator::Switch {
                cond, cases, default, ..
            } => {
                let cond = *cond;
                let svals = states.svals();
                let ty = &program.expr(cond).ty;
                let pred = self.materialize(pred, state, exit);
                let nodes = self.run_checkers(vec![pred], exit, count, |checker, ctx| {
                    checker.check_branch_condition(cond, ctx)
                });
                for node in nodes {
                    let state = self.state_of(node);
                    let value = states.expr_value(&state, frame, cond);
                    let mut rest = Some(state.clone());
                    for case in cases {
                        if value.is_unknown_or_undef() {
                            self.add_block_edge(node, state.clone(), block, case.block, frame, counter);
                            continue;
                        }
                        let matches =
                            svals.eval_binop(BinOp::Eq, value.clone(), svals.make_int(case.value, ty), &Type::Int);
                        if let Some(state) = states.assume(&state, &matches, true) {
                            self.add_block_edge(node, state, block, case.block, frame, counter);
                        }
                        rest = rest.and_then(|state| states.assume(&state, &matches, false));
                    }
                    if let Some(state) = rest {
                        self.add_block_edge(node, state, block, *default, frame, counter);
                    }
                }
            }
            Terminator::Exit => {
                let pred = self.materialize(pred, state, exit);
                let end = ProgramPoint::new(PointKind::EndFunction, frame);
                let nodes = self.run_checkers(vec![pred], end, count, |checker, ctx| checker.check_end_function(ctx));
                for node in nodes {
                    let state = self.state_of(node);
                    let (done, is_new) = self.graph.get_node(end, state, false);
                    self.graph.add_edge(node, done);
                    if is_new {
                        self.enqueue(done, counter);
                    }
                }
            }
        }
        Ok(())
    }

    fn add_block_edge(
        &mut self,
        pred: NodeId,
        state: ProgramStateRef,
        src: BlockId,
        dst: BlockId,
        frame: FrameId,
        counter: &BlockCounter,
    ) {
        let point = ProgramPoint::new(PointKind::BlockEdge { src, dst }, frame);
        let (node, is_new) = self.graph.get_node(point, state, false);
        self.graph.add_edge(pred, node);
        if is_new {
            self.enqueue(node, counter);
        }
    }

    // ===== Function exit =====

    fn leave_frame(&mut self, node: NodeId, frame: FrameId, counter: &BlockCounter) -> Result<(), EngineError> {
        let state = self.state_of(node);
        match self.stack_frame(frame)? {
            StackFrame {
                parent: Some(_),
                call_site: Some(site),
                ..
            } => {
                let exit = ProgramPoint::new(PointKind::CallExit { site }, frame);
                let (returned, is_new) = self.graph.get_node(exit, state, false);
                self.graph.add_edge(node, returned);
                if is_new {
                    self.enqueue(returned, counter);
                }
            }
            _ => {
                // the path is over: only globals and the return value survive
                let reaper = self.live_symbols(&state, None, None);
                let end = ProgramPoint::new(PointKind::EndFunction, frame);
                self.run_checkers(vec![node], end, 0, |checker, ctx| checker.check_dead_symbols(&reaper, ctx));
            }
        }
        Ok(())
    }

    // ===== Initial state =====

    /// Globals hold their initializers only when the analysis starts at
    /// `main`; any other entry point may run after arbitrary code.
    fn initial_state(&self, decl: &FunctionDecl, frame: FrameId) -> ProgramStateRef {
        let states = self.states;
        let mut state = states.initial_state();
        if decl.name != "main" {
            return state;
        }
        let regions = states.regions();
        for global in &self.program.globals {
            let region = regions.var_region(global.var, frame);
            let ty = &self.program.var(global.var).ty;
            state = match &global.value {
                None => states.bind_default(&state, region, SVal::int(0)),
                Some(init) => self.bind_constant(state, region, ty, init),
            };
        }
        state
    }

    fn bind_constant(&self, state: ProgramStateRef, region: RegionId, ty: &Type, init: &ConstInit) -> ProgramStateRef {
        let program = self.program;
        let states = self.states;
        let regions = states.regions();
        match init {
            ConstInit::Int(n) => states.bind_loc(&state, Loc::Region(region), states.svals().make_int(*n, ty)),
            ConstInit::Null => states.bind_loc(&state, Loc::Region(region), SVal::null()),
            ConstInit::String(expr) if ty.is_pointer() => {
                let string = regions.string_region(*expr);
                let first = regions.element_region(Type::Char, RegionIndex::Concrete(0), string);
                states.bind_loc(&state, Loc::Region(region), SVal::region(first))
            }
            ConstInit::String(_) => state,
            ConstInit::List(items) => {
                let mut state = states.bind_default(&state, region, SVal::int(0));
                for (index, item) in items.iter().enumerate() {
                    let (part, part_type) = match ty {
                        Type::Array(element, _) => (
                            regions.element_region((**element).clone(), RegionIndex::Concrete(index as i64), region),
                            (**element).clone(),
                        ),
                        Type::Struct(name) => {
                            let Some(owner) = program.struct_by_name(name) else { break };
                            let Some(info) = program.struct_info(owner).fields.get(index) else { break };
                            let field = FieldId {
                                owner,
                                index: index as u32,
                            };
                            (regions.field_region(field, region), info.ty.clone())
                        }
                        _ => break,
                    };
                    state = self.bind_constant(state, part, &part_type, item);
                }
                state
            }
        }
    }
}

/// Expression a widened loop conjures its fresh values for.
fn loop_expr(block: &BasicBlock) -> Option<ExprId> {
    match &block.terminator {
        Terminator::Branch { cond, .. } | Terminator::Switch { cond, .. } => Some(*cond),
        _ => block.elements.iter().find_map(|element| match element {
            CfgElement::Expr { expr, .. } => Some(*expr),
            _ => None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_program;
    use crate::frontend::parse_source;
    use crate::memory::MemRegionManager;
    use crate::store::store_manager;
    use crate::svals::SymbolManager;
    use test_log::test;

    fn explore<R>(
        source: &str,
        function: &str,
        options: &AnalyzerOptions,
        inspect: impl FnOnce(&mut ExprEngine<'_, '_>) -> R,
    ) -> R {
        let program = build_program(&parse_source(source).unwrap(), "test.c").unwrap();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let frames = LocationContextManager::new();
        let states = ProgramStateManager::new(&regions, &symbols, store_manager(options.store));
        let checkers = CheckerManager::from_names(&options.checkers).unwrap();
        let mut engine = ExprEngine::new(&program, options, &checkers, &frames, &states);
        engine.run(program.function_by_name(function).unwrap()).unwrap();
        inspect(&mut engine)
    }

    fn end_nodes(engine: &ExprEngine<'_, '_>) -> usize {
        engine
            .graph()
            .iter()
            .filter(|(_, node)| node.point.kind == PointKind::EndFunction && node.point.tag.is_none())
            .count()
    }

    #[test]
    fn test_straight_line_code_reaches_the_end() {
        let options = AnalyzerOptions::default();
        let ends = explore("int f(void) { int x = 1; x = x + 1; return x; }", "f", &options, |e| {
            end_nodes(e)
        });
        assert_eq!(ends, 1);
    }

    #[test]
    fn test_infeasible_branches_are_pruned() {
        let source = "int f(int a) { int r = 0; if (a > 5) { if (a < 3) { r = 1; } } return r; }";
        let options = AnalyzerOptions::default();
        let assigned = explore(source, "f", &options, |engine| {
            let program = engine.program;
            engine
                .graph()
                .iter()
                .filter(|(_, node)| {
                    let Some((block, index)) = node.point.statement() else { return false };
                    let Ok(element) = engine.block(node.point.frame, block).map(|b| &b.elements[index as usize]) else {
                        return false;
                    };
                    matches!(element, CfgElement::Expr { expr, .. }
                        if matches!(program.expr(*expr).kind, crate::cfg::ExprKind::Assign { .. }))
                })
                .count()
        });
        assert_eq!(assigned, 0);
    }

    #[test]
    fn test_loops_terminate_under_both_policies() {
        let source = "int f(int n) { int i = 0; int s = 0; while (i < n) { s = s + i; i = i + 1; } return s; }";
        for policy in [LoopExhaustion::Sink, LoopExhaustion::Widen] {
            let options = AnalyzerOptions {
                loop_exhaustion: policy,
                ..AnalyzerOptions::default()
            };
            let (ends, coverage) = explore(source, "f", &options, |e| (end_nodes(e), e.coverage().to_vec()));
            assert!(ends >= 1, "{:?} never reached the end", policy);
            assert!(coverage.iter().all(|note| note.kind == CoverageKind::BlockLimit));
        }
    }

    #[test]
    fn test_node_budget_stops_exploration() {
        let options = AnalyzerOptions {
            max_nodes: 4,
            ..AnalyzerOptions::default()
        };
        let (nodes, coverage) = explore(
            "int f(int a) { int x = 0; if (a) x = 1; else x = 2; return x; }",
            "f",
            &options,
            |e| (e.graph().len(), e.coverage().to_vec()),
        );
        assert!(nodes < 40);
        assert_eq!(coverage.len(), 1);
        assert_eq!(coverage[0].kind, CoverageKind::NodeBudget);
        assert_eq!(coverage[0].function, "f");
    }

    #[test]
    fn test_main_starts_from_global_initializers() {
        let source = "int g = 3; int *p; int main(void) { return g; }";
        let options = AnalyzerOptions::default();
        let returned = explore(source, "main", &options, |engine| {
            let (_, end) = engine
                .graph()
                .iter()
                .find(|(_, node)| node.point.kind == PointKind::EndFunction)
                .unwrap();
            end.state.env.return_value(end.point.frame).cloned()
        });
        assert_eq!(returned, Some(SVal::int(3)));
    }

    #[test]
    fn test_inlined_call_returns_its_value() {
        let source = "int twice(int v) { return v * 2; } int f(void) { int r = twice(21); return r; }";
        let options = AnalyzerOptions::default();
        let (returned, entered) = explore(source, "f", &options, |engine| {
            let entered = engine
                .graph()
                .iter()
                .any(|(_, node)| matches!(node.point.kind, PointKind::CallEnter { .. }));
            let top_end = engine
                .graph()
                .iter()
                .find(|(_, node)| {
                    node.point.kind == PointKind::EndFunction
                        && engine.frames.frame(node.point.frame).is_some_and(|f| f.parent.is_none())
                })
                .map(|(_, node)| node.state.env.return_value(node.point.frame).cloned());
            (top_end.flatten(), entered)
        });
        assert!(entered);
        assert_eq!(returned, Some(SVal::int(42)));
    }
}
