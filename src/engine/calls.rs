// Function calls: checker-modelled, inlined, or evaluated conservatively

use super::expr_engine::{EngineError, ExprEngine};
use super::graph::NodeId;
use super::program_point::{PointKind, ProgramPoint};
use super::transfer::Evaluated;
use super::worklist::BlockCounter;
use crate::cfg::{CallSite, ExprId, ExprKind, FrameId, FunctionId};
use crate::checkers::{CallEvent, CheckerContext};
use crate::frontend::ast::SourceLocation;
use crate::memory::{GlobalsKind, MemRegion};
use crate::state::ProgramStateRef;
use crate::store::Invalidation;
use crate::svals::{Loc, SVal};
use log::{debug, trace};

impl<'a, 'p> ExprEngine<'a, 'p> {
    /// The call at `expr` with its argument values in `state`.
    pub(crate) fn call_event(&self, state: &ProgramStateRef, expr: ExprId, frame: FrameId, site: CallSite) -> Option<CallEvent> {
        let program = self.program;
        let ExprKind::Call { callee, args } = &program.expr(expr).kind else {
            return None;
        };
        Some(CallEvent {
            expr,
            callee: *callee,
            name: program.function(*callee).name.clone(),
            args: args.iter().map(|arg| self.states.expr_value(state, frame, *arg)).collect(),
            arg_exprs: args.clone(),
            frame,
            site,
            conservative: false,
            invalidated: Vec::new(),
        })
    }

    pub(crate) fn eval_call(
        &mut self,
        pred: NodeId,
        expr: ExprId,
        callee: FunctionId,
        args: &[ExprId],
        pre: ProgramPoint,
        counter: &BlockCounter,
    ) -> Result<Vec<Evaluated>, EngineError> {
        let Some((block, index)) = pre.statement() else { return Ok(Vec::new()) };
        let count = counter.get(pre.frame, block);
        let site = CallSite { block, index, expr };
        let Some(call) = self.call_event(&self.state_of(pred), expr, pre.frame, site) else {
            return Ok(Vec::new());
        };
        trace!("call to '{}' with {} arguments", call.name, args.len());

        let nodes = self.run_checkers(vec![pred], pre, count, |checker, ctx| checker.check_pre_call(&call, ctx));
        let mut evaluated = Vec::new();
        for node in nodes {
            if let Some(modelled) = self.checker_eval_call(node, &call, pre, count) {
                for done in modelled {
                    evaluated.push(Evaluated {
                        pred: done,
                        state: self.state_of(done),
                        call: Some(call.clone()),
                    });
                }
            } else if self.should_inline(callee, pre.frame) {
                self.inline_call(node, &call, callee, counter);
            } else {
                evaluated.push(self.conservative_call(node, &call, count));
            }
        }
        Ok(evaluated)
    }

    /// Let the first checker that models the callee evaluate the call.
    fn checker_eval_call(
        &mut self,
        pred: NodeId,
        call: &CallEvent,
        pre: ProgramPoint,
        count: u32,
    ) -> Option<Vec<NodeId>> {
        let checkers = self.checkers;
        for checker in checkers.iter() {
            let mut ctx = CheckerContext::new(
                self.program,
                self.frames,
                self.states,
                &mut self.graph,
                &mut self.reporter,
                pred,
                pre.with_tag(checker.name()),
                count,
            );
            if checker.eval_call(call, &mut ctx) {
                trace!("'{}' evaluated by {}", call.name, checker.name());
                return Some(ctx.finish());
            }
        }
        None
    }

    fn should_inline(&self, callee: FunctionId, frame: FrameId) -> bool {
        let options = self.options;
        if !options.inline_calls || !self.program.function(callee).is_defined() {
            return false;
        }
        let depth = self.frames.frame(frame).map_or(0, |f| f.depth);
        depth < options.max_inline_depth && !self.frames.is_on_stack(frame, callee)
    }

    /// Bind the arguments in a new frame and continue the path in the callee.
    fn inline_call(&mut self, pred: NodeId, call: &CallEvent, callee: FunctionId, counter: &BlockCounter) {
        let states = self.states;
        let regions = states.regions();
        let program = self.program;
        let decl = program.function(callee);
        let callee_frame = self.frames.callee_frame(call.frame, callee, call.site);

        let mut state = self.state_of(pred);
        for (position, param) in decl.params.iter().enumerate() {
            let value = call.arg(position).cloned().unwrap_or(SVal::Unknown);
            state = states.bind_loc(&state, Loc::Region(regions.var_region(*param, callee_frame)), value);
        }
        debug!("inlining '{}' at depth {}", decl.name, self.frames.frame(callee_frame).map_or(0, |f| f.depth));

        let point = ProgramPoint::new(
            PointKind::CallEnter {
                site: call.site,
                callee,
            },
            call.frame,
        );
        let (node, is_new) = self.graph.get_node(point, state, false);
        self.graph.add_edge(pred, node);
        if is_new {
            self.enqueue(node, counter);
        }
    }

    /// Model a call the engine cannot see into: everything the arguments
    /// point to (and globals, if configured) may have changed, and the
    /// result is a fresh symbol.
    fn conservative_call(&mut self, pred: NodeId, call: &CallEvent, count: u32) -> Evaluated {
        let program = self.program;
        let states = self.states;
        let regions = states.regions();

        let mut targets = Vec::new();
        for region in call.args.iter().filter_map(SVal::as_region) {
            let base = regions.base_region(region);
            let read_only = matches!(
                regions.get(regions.memory_space(base)),
                MemRegion::Globals(GlobalsKind::Immutable) | MemRegion::CodeSpace
            );
            if !read_only && !targets.contains(&base) {
                targets.push(base);
            }
        }
        let request = Invalidation {
            regions: targets,
            expr: call.expr,
            frame: call.frame,
            count,
            include_globals: self.options.invalidate_globals_on_call,
        };
        let (mut state, invalidated) = states.invalidate_regions(&self.state_of(pred), &request);

        let return_type = &program.expr(call.expr).ty;
        if !return_type.is_void() {
            let value = states.svals().conjure(call.expr, call.frame, return_type, count);
            state = states.bind_expr(&state, call.frame, call.expr, value);
        }
        Evaluated {
            pred,
            state,
            call: Some(CallEvent {
                conservative: true,
                invalidated,
                ..call.clone()
            }),
        }
    }

    /// Continue the caller after an inlined call: bind the returned value
    /// to the call expression and drop the callee's frame.
    pub(crate) fn return_to_caller(
        &mut self,
        node: NodeId,
        site: CallSite,
        callee: FrameId,
        counter: &BlockCounter,
    ) -> Result<(), EngineError> {
        let states = self.states;
        let caller = self.frames.frame(callee).and_then(|f| f.parent).ok_or(EngineError::MissingFrame {
            frame: callee.0,
            location: SourceLocation::default(),
        })?;
        let Some(element) = self.block(caller, site.block)?.elements.get(site.index as usize) else {
            return Err(EngineError::MissingBlock {
                function: self.function_of(caller)?.name.clone(),
                block: site.block,
                location: self.program.expr(site.expr).location(),
            });
        };

        let returned_value = |state: &ProgramStateRef| state.env.return_value(callee).cloned().unwrap_or(SVal::Unknown);
        let pop_frame = |state: &ProgramStateRef| {
            let bound = states.bind_expr(state, caller, site.expr, returned_value(state));
            states.remove_frame(&bound, callee)
        };

        let reaper = self.live_symbols(&pop_frame(&self.state_of(node)), Some(caller), None);
        let post = ProgramPoint::new(
            PointKind::PostStmt {
                block: site.block,
                index: site.index,
            },
            caller,
        );
        let count = counter.get(caller, site.block);
        let nodes = self.run_checkers(vec![node], post, count, |checker, ctx| checker.check_dead_symbols(&reaper, ctx));
        for done in nodes {
            let state = states.remove_dead(&pop_frame(&self.state_of(done)), &reaper);
            let call = self.call_event(&self.state_of(node), site.expr, caller, site);
            self.finish_element(Evaluated { pred: done, state, call }, element, site.block, site.index, caller, counter);
        }
        Ok(())
    }
}
