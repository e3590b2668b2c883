//! unix.Malloc
//!
//! Tracks heap memory from `malloc`/`calloc` to `free` with one entry per
//! allocation symbol in the program state (`alloca` results live on the
//! stack and are not tracked):
//!
//! ```text
//!            malloc                free
//!   (none) ─────────▶ Allocated ─────────▶ Released
//!                        │
//!                        │ passed to an opaque call, stored outside the stack
//!                        ▼
//!                     Escaped
//! ```
//!
//! Freeing released memory, touching it, or losing the last reference to
//! allocated memory is reported.

use super::{CallEvent, Checker, CheckerContext};
use crate::cfg::{ExprId, VarKind};
use crate::engine::NodeId;
use crate::frontend::ast::SourceRange;
use crate::memory::MemRegion;
use crate::report::{BugReport, BugReporterVisitor, BugType, EventPiece, PathContext};
use crate::state::{ProgramStateRef, ProgramStateTrait, SymbolReaper, TraitEntry, TraitValue, Truth};
use crate::svals::{SVal, SymbolId};

const DOUBLE_FREE: BugType = BugType::new("Double free", "Memory error");
const USE_AFTER_FREE: BugType = BugType::new("Use-after-free", "Memory error");
const BAD_FREE: BugType = BugType::new("Bad free", "Memory error");
const LEAK: BugType = BugType::new("Memory leak", "Memory error");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    Allocated,
    Released,
    /// No longer ours to track
    Escaped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefState {
    pub kind: AllocationKind,
    /// The allocating call
    pub origin: ExprId,
}

/// Allocation symbol → [`RefState`]
pub struct RegionState;

impl ProgramStateTrait for RegionState {
    const TAG: &'static str = "unix.Malloc.RegionState";
    type Key = SymbolId;
    type Value = RefState;

    fn encode_key(key: &SymbolId) -> TraitEntry {
        TraitEntry::Symbol(*key)
    }

    fn decode_key(entry: TraitEntry) -> Option<SymbolId> {
        match entry {
            TraitEntry::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    fn encode_value(value: &RefState) -> TraitValue {
        let kind = match value.kind {
            AllocationKind::Allocated => 0,
            AllocationKind::Released => 1,
            AllocationKind::Escaped => 2,
        };
        TraitValue::Tagged {
            kind,
            expr: value.origin.0,
        }
    }

    fn decode_value(value: &TraitValue) -> Option<RefState> {
        let TraitValue::Tagged { kind, expr } = value else { return None };
        let kind = match kind {
            0 => AllocationKind::Allocated,
            1 => AllocationKind::Released,
            2 => AllocationKind::Escaped,
            _ => return None,
        };
        Some(RefState {
            kind,
            origin: ExprId(*expr),
        })
    }
}

pub struct MallocChecker;

/// Allocation symbol behind a pointer value.
fn tracked_symbol(ctx: &CheckerContext<'_, '_, '_>, value: &SVal) -> Option<SymbolId> {
    ctx.states().regions().symbolic_base(value.as_region()?)
}

impl MallocChecker {
    fn report_on_symbol(
        &self,
        ctx: &mut CheckerContext<'_, '_, '_>,
        bug_type: BugType,
        description: &str,
        symbol: SymbolId,
        range: SourceRange,
    ) {
        let state = ctx.state();
        let node = ctx.generate_sink(state);
        let mut report = BugReport::new(bug_type, description, node, range.begin);
        report.add_range(range);
        report.mark_interesting_symbol(symbol);
        report.add_visitor(Box::new(MallocVisitor { symbol }));
        ctx.emit_report(report);
    }

    fn allocate(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>, zeroed: bool) {
        let states = ctx.states();
        let return_type = ctx.program().expr(call.expr).ty.clone();
        let symbol = states
            .symbols()
            .conjured(call.expr, call.frame, return_type, ctx.block_count(), None);
        let region = states.regions().symbolic_heap_region(symbol);

        let mut state = states.bind_expr(&ctx.state(), call.frame, call.expr, SVal::region(region));
        if zeroed {
            state = states.bind_default(&state, region, SVal::int(0));
        }
        let allocated = RefState {
            kind: AllocationKind::Allocated,
            origin: call.expr,
        };
        let state = states.set::<RegionState>(&state, &symbol, &allocated);
        ctx.add_transition(state);
    }

    fn release(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) {
        let Some(argument) = call.arg(0).cloned() else { return };
        let state = ctx.state();
        let range = call.arg_range(ctx.program(), 0).unwrap_or_default();
        if argument.is_unknown_or_undef() || ctx.states().is_zero(&state, &argument) == Truth::True {
            return;
        }
        let Some(region) = argument.as_region() else { return };

        let program = ctx.program();
        let regions = ctx.states().regions();
        let base = regions.base_region(region);
        match regions.get(base) {
            MemRegion::Symbolic { symbol, .. } => {
                let current = state.get::<RegionState>(&symbol);
                if current.is_some_and(|s| s.kind == AllocationKind::Released) {
                    self.report_on_symbol(ctx, DOUBLE_FREE, "Attempt to free released memory", symbol, range);
                    return;
                }
                let released = RefState {
                    kind: AllocationKind::Released,
                    origin: current.map_or(call.expr, |s| s.origin),
                };
                let state = ctx.states().set::<RegionState>(&state, &symbol, &released);
                ctx.add_transition(state);
            }
            other => {
                let what = match other {
                    MemRegion::Var { var, .. } => {
                        let decl = program.var(var);
                        let kind = match decl.kind {
                            VarKind::Param(_) => "parameter",
                            VarKind::Local => "local variable",
                            VarKind::StaticLocal => "static variable",
                            VarKind::Global { .. } => "global variable",
                        };
                        format!("the address of the {} '{}'", kind, decl.name)
                    }
                    MemRegion::String { .. } => "a string literal".to_string(),
                    MemRegion::Alloca { .. } => "memory allocated by alloca()".to_string(),
                    _ => "a pointer".to_string(),
                };
                let description = format!("Argument to free() is {}, which is not memory allocated by malloc()", what);
                let node = ctx.generate_sink(state);
                let mut report = BugReport::new(BAD_FREE, description, node, range.begin);
                report.add_range(range);
                ctx.emit_report(report);
            }
        }
    }

    /// Stop tracking `value` if it is memory we consider allocated.
    fn escape(&self, ctx: &CheckerContext<'_, '_, '_>, state: ProgramStateRef, value: &SVal) -> ProgramStateRef {
        match tracked_symbol(ctx, value) {
            Some(symbol) => self.escape_symbol(ctx, state, symbol),
            None => state,
        }
    }

    fn escape_symbol(&self, ctx: &CheckerContext<'_, '_, '_>, state: ProgramStateRef, symbol: SymbolId) -> ProgramStateRef {
        match state.get::<RegionState>(&symbol) {
            Some(current) if current.kind == AllocationKind::Allocated => {
                let escaped = RefState {
                    kind: AllocationKind::Escaped,
                    origin: current.origin,
                };
                ctx.states().set::<RegionState>(&state, &symbol, &escaped)
            }
            _ => state,
        }
    }

    fn is_released(&self, ctx: &CheckerContext<'_, '_, '_>, value: &SVal) -> Option<SymbolId> {
        let symbol = tracked_symbol(ctx, value)?;
        let current = ctx.state().get::<RegionState>(&symbol)?;
        (current.kind == AllocationKind::Released).then_some(symbol)
    }
}

impl Checker for MallocChecker {
    fn name(&self) -> &'static str {
        "unix.Malloc"
    }

    fn eval_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) -> bool {
        match call.name.as_str() {
            "malloc" => self.allocate(call, ctx, false),
            "calloc" => self.allocate(call, ctx, true),
            "free" => self.release(call, ctx),
            "alloca" => {
                let states = ctx.states();
                let region = states.regions().alloca_region(call.expr, ctx.block_count(), call.frame);
                let state = states.bind_expr(&ctx.state(), call.frame, call.expr, SVal::region(region));
                ctx.add_transition(state);
            }
            _ => return false,
        }
        true
    }

    fn check_pre_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) {
        if call.name == "free" {
            return;
        }
        for (index, argument) in call.args.iter().enumerate() {
            if let Some(symbol) = self.is_released(ctx, argument) {
                let range = call.arg_range(ctx.program(), index).unwrap_or_default();
                self.report_on_symbol(ctx, USE_AFTER_FREE, "Use of memory after it is freed", symbol, range);
                return;
            }
        }
    }

    fn check_post_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) {
        if !call.conservative {
            return;
        }
        let mut state = ctx.state();
        for argument in &call.args {
            state = self.escape(ctx, state, argument);
        }
        // pointers stored in memory the callee could reach
        for symbol in &call.invalidated {
            state = self.escape_symbol(ctx, state, *symbol);
        }
        ctx.add_transition(state);
    }

    fn check_location(&self, location: &SVal, _is_load: bool, lvalue: ExprId, ctx: &mut CheckerContext<'_, '_, '_>) {
        if let Some(symbol) = self.is_released(ctx, location) {
            let range = ctx.program().expr(lvalue).range;
            self.report_on_symbol(ctx, USE_AFTER_FREE, "Use of memory after it is freed", symbol, range);
        }
    }

    fn check_bind(&self, location: &SVal, value: &SVal, _range: SourceRange, ctx: &mut CheckerContext<'_, '_, '_>) {
        let Some(target) = location.as_region() else { return };
        if ctx.states().regions().has_stack_storage(target) {
            return;
        }
        let state = self.escape(ctx, ctx.state(), value);
        ctx.add_transition(state);
    }

    fn check_dead_symbols(&self, reaper: &SymbolReaper<'_, '_>, ctx: &mut CheckerContext<'_, '_, '_>) {
        let states = ctx.states();
        let mut state = ctx.state();
        let mut leaks = Vec::new();
        for (symbol, current) in state.entries::<RegionState>() {
            if !reaper.is_dead_symbol(symbol) {
                continue;
            }
            if current.kind == AllocationKind::Allocated {
                // an allocation that failed is not a leak
                let pointer = SVal::region(states.regions().symbolic_heap_region(symbol));
                if states.assume(&state, &pointer, true).is_some() {
                    leaks.push((symbol, current.origin));
                }
            }
            state = states.remove::<RegionState>(&state, &symbol);
        }

        if leaks.is_empty() {
            ctx.add_transition(state);
            return;
        }
        let node = ctx.generate_error_node(state);
        for (symbol, origin) in leaks {
            let location = ctx.program().expr(origin).location();
            let mut report = BugReport::new(LEAK, "Potential memory leak", node, location);
            report.mark_interesting_symbol(symbol);
            report.add_visitor(Box::new(MallocVisitor { symbol }));
            ctx.emit_report(report);
        }
    }
}

/// Points out where the memory of a report was allocated and released.
pub struct MallocVisitor {
    symbol: SymbolId,
}

impl BugReporterVisitor for MallocVisitor {
    fn visit_node(
        &mut self,
        succ: NodeId,
        pred: NodeId,
        ctx: &PathContext<'_, '_, '_>,
        _report: &BugReport,
    ) -> Option<EventPiece> {
        let after = ctx.graph.node(succ).state.get::<RegionState>(&self.symbol)?;
        let before = ctx.graph.node(pred).state.get::<RegionState>(&self.symbol);
        let message = match (before.map(|s| s.kind), after.kind) {
            (None, AllocationKind::Allocated) => "Memory is allocated",
            (Some(AllocationKind::Allocated | AllocationKind::Escaped), AllocationKind::Released) => {
                "Memory is released"
            }
            _ => return None,
        };
        let range = ctx.node_range(succ)?;
        Some(EventPiece::new(range.begin, message).with_range(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GenericDataMap;

    #[test]
    fn test_ref_state_encoding() {
        let released = RefState {
            kind: AllocationKind::Released,
            origin: ExprId(12),
        };
        let gdm = GenericDataMap::default().set::<RegionState>(&SymbolId(3), &released);
        assert_eq!(gdm.get::<RegionState>(&SymbolId(3)), Some(released));
        assert_eq!(gdm.get::<RegionState>(&SymbolId(4)), None);
        assert_eq!(RegionState::decode_value(&TraitValue::Tagged { kind: 9, expr: 0 }), None);
    }
}
