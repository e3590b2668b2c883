// Effect of single CFG elements on the program state

use super::expr_engine::{EngineError, ExprEngine};
use super::graph::NodeId;
use super::program_point::ProgramPoint;
use super::worklist::BlockCounter;
use crate::cfg::{CfgElement, DeclInit, ExprId, ExprKind, InitStep, MergeValue, VarId};
use crate::checkers::CallEvent;
use crate::frontend::ast::{BinOp, SourceRange, Type};
use crate::memory::{RegionId, RegionIndex};
use crate::state::ProgramStateRef;
use crate::svals::{Loc, SVal};
use log::trace;

/// A path after evaluating one element, before the post-statement
/// callbacks run on it.
pub(crate) struct Evaluated {
    pub pred: NodeId,
    pub state: ProgramStateRef,
    /// Set when the element was a call the engine did not inline
    pub call: Option<CallEvent>,
}

impl Evaluated {
    fn new(pred: NodeId, state: ProgramStateRef) -> Self {
        Self { pred, state, call: None }
    }
}

impl<'a, 'p> ExprEngine<'a, 'p> {
    /// Evaluate `element` starting from `pred`. Paths that continue in a
    /// callee are queued directly and not returned.
    pub(crate) fn transfer(
        &mut self,
        pred: NodeId,
        element: &'p CfgElement,
        pre: ProgramPoint,
        counter: &BlockCounter,
    ) -> Result<Vec<Evaluated>, EngineError> {
        let states = self.states;
        let frame = pre.frame;
        let state = self.state_of(pred);

        match element {
            CfgElement::Expr { expr, .. } => self.eval_expr(pred, *expr, pre, counter),
            CfgElement::Decl { var, init, location } => {
                let region = states.regions().var_region(*var, frame);
                match init {
                    None => Ok(vec![Evaluated::new(pred, states.kill_binding(&state, region))]),
                    Some(DeclInit::Expr(init)) => {
                        let program = self.program;
                        let init_expr = program.expr(*init);
                        if let (Type::Array(..), ExprKind::StringLiteral(text)) = (&program.var(*var).ty, &init_expr.kind) {
                            let state = self.bind_string_contents(state, region, text);
                            return Ok(vec![Evaluated::new(pred, state)]);
                        }
                        let value = states.expr_value(&state, frame, *init);
                        let range = SourceRange::new(*location, init_expr.range.end);
                        let count = pre.statement().map_or(0, |(block, _)| counter.get(frame, block));
                        Ok(self
                            .store_value(pred, SVal::region(region), value, range, pre, count)
                            .into_iter()
                            .map(|(node, state)| Evaluated::new(node, state))
                            .collect())
                    }
                    Some(DeclInit::List(entries)) => {
                        let state = states.kill_binding(&state, region);
                        let mut state = states.bind_default(&state, region, SVal::int(0));
                        for entry in entries {
                            let target = self.init_target(*var, region, &entry.path);
                            let value = states.expr_value(&state, frame, entry.value);
                            state = states.bind_loc(&state, Loc::Region(target), value);
                        }
                        Ok(vec![Evaluated::new(pred, state)])
                    }
                }
            }
            CfgElement::Merge { target, value } => {
                let value = match value {
                    MergeValue::Int(n) => states.svals().make_int(*n, &self.program.expr(*target).ty),
                    MergeValue::Expr(source) => states.expr_value(&state, frame, *source),
                };
                Ok(vec![Evaluated::new(pred, states.bind_expr(&state, frame, *target, value))])
            }
            CfgElement::Return { value, .. } => {
                let state = match value {
                    Some(value) => {
                        let returned = states.expr_value(&state, frame, *value);
                        states.bind_return_value(&state, frame, returned)
                    }
                    None => state,
                };
                Ok(vec![Evaluated::new(pred, state)])
            }
        }
    }

    fn eval_expr(
        &mut self,
        pred: NodeId,
        id: ExprId,
        pre: ProgramPoint,
        counter: &BlockCounter,
    ) -> Result<Vec<Evaluated>, EngineError> {
        let program = self.program;
        let states = self.states;
        let svals = states.svals();
        let regions = states.regions();
        let frame = pre.frame;
        let expr = program.expr(id);
        let state = self.state_of(pred);
        let count = pre.statement().map_or(0, |(block, _)| counter.get(frame, block));
        let value_of = |operand: ExprId| states.expr_value(&state, frame, operand);

        let value = match &expr.kind {
            ExprKind::IntLiteral(n) => svals.make_int(*n, &expr.ty),
            ExprKind::Null => SVal::null(),
            ExprKind::StringLiteral(_) => SVal::region(regions.string_region(id)),
            ExprKind::VarRef(var) => SVal::region(regions.var_region(*var, frame)),
            ExprKind::AddrOf(operand) => value_of(*operand),
            // bound by the merges of the incoming paths
            ExprKind::Join => return Ok(vec![Evaluated::new(pred, state.clone())]),
            ExprKind::Decay(array) => match value_of(*array).as_region() {
                Some(region) => {
                    let element = program.expr(*array).ty.element_type().or(expr.ty.pointee()).cloned().unwrap_or(Type::Char);
                    SVal::region(regions.element_region(element, RegionIndex::Concrete(0), region))
                }
                None => value_of(*array),
            },
            ExprKind::Deref(pointer) => {
                let pointer = value_of(*pointer);
                match pointer.as_region() {
                    Some(region) => SVal::region(states.cast_region(region, &expr.ty)),
                    None => pointer,
                }
            }
            ExprKind::Unary { op, operand } => svals.eval_unary(*op, value_of(*operand), &expr.ty),
            ExprKind::Binary { op, lhs, rhs } => {
                let (left, right) = (value_of(*lhs), value_of(*rhs));
                if *op == BinOp::Sub && program.expr(*lhs).ty.is_pointer() && program.expr(*rhs).ty.is_pointer() {
                    svals.eval_pointer_diff(&left, &right)
                } else {
                    svals.eval_binop(*op, left, right, &expr.ty)
                }
            }
            ExprKind::Member { base, field } => match value_of(*base).as_region() {
                Some(region) => SVal::region(regions.field_region(*field, region)),
                None => value_of(*base),
            },
            ExprKind::Index { base, index } => {
                let base_type = &program.expr(*base).ty;
                let element = svals.eval_binop(BinOp::Add, value_of(*base), value_of(*index), base_type);
                match element.as_region() {
                    Some(region) => SVal::region(states.cast_region(region, &expr.ty)),
                    None => element,
                }
            }
            ExprKind::Cast { operand } => svals.eval_cast(value_of(*operand), &program.expr(*operand).ty, &expr.ty),
            ExprKind::Load(lvalue) => return Ok(self.eval_load(pred, id, *lvalue, pre, count)),
            ExprKind::Assign { target, value } => {
                let location = value_of(*target);
                let value = value_of(*value);
                return Ok(self.eval_store(pred, id, *target, location, move |_| (value.clone(), value.clone()), pre, count));
            }
            ExprKind::CompoundAssign { op, target, value } => {
                let location = value_of(*target);
                let operand = value_of(*value);
                let op = *op;
                let ty = expr.ty.clone();
                return Ok(self.eval_store(
                    pred,
                    id,
                    *target,
                    location,
                    move |old| {
                        let new = svals.eval_binop(op, old, operand.clone(), &ty);
                        (new.clone(), new)
                    },
                    pre,
                    count,
                ));
            }
            ExprKind::IncDec {
                target,
                increment,
                prefix,
            } => {
                let location = value_of(*target);
                let op = if *increment { BinOp::Add } else { BinOp::Sub };
                let prefix = *prefix;
                let ty = expr.ty.clone();
                return Ok(self.eval_store(
                    pred,
                    id,
                    *target,
                    location,
                    move |old| {
                        let step = if ty.is_pointer() { SVal::int(1) } else { svals.make_int(1, &ty) };
                        let new = svals.eval_binop(op, old.clone(), step, &ty);
                        let result = if prefix { new.clone() } else { old };
                        (new, result)
                    },
                    pre,
                    count,
                ));
            }
            ExprKind::Call { callee, args } => return self.eval_call(pred, id, *callee, args, pre, counter),
        };

        trace!("{} = {}", program.describe_expr(id).unwrap_or_default(), states.dump_value(&value));
        Ok(vec![Evaluated::new(pred, states.bind_expr(&state, frame, id, value))])
    }

    /// Read through the location of `lvalue`.
    fn eval_load(&mut self, pred: NodeId, id: ExprId, lvalue: ExprId, pre: ProgramPoint, count: u32) -> Vec<Evaluated> {
        let program = self.program;
        let states = self.states;
        let frame = pre.frame;
        let ty = &program.expr(id).ty;
        let location = states.expr_value(&self.state_of(pred), frame, lvalue);

        let nodes = self.run_checkers(vec![pred], pre, count, |checker, ctx| {
            checker.check_location(&location, true, lvalue, ctx)
        });
        nodes
            .into_iter()
            .map(|node| {
                let state = self.state_of(node);
                let value = match location.as_loc() {
                    Some(loc) => states.get_sval(&state, loc, ty),
                    None => SVal::Unknown,
                };
                Evaluated::new(node, states.bind_expr(&state, frame, id, value))
            })
            .collect()
    }

    /// Write to the location of `target`. `update` maps the old contents to
    /// the stored value and the value of the whole expression.
    #[allow(clippy::too_many_arguments)]
    fn eval_store<F>(
        &mut self,
        pred: NodeId,
        id: ExprId,
        target: ExprId,
        location: SVal,
        update: F,
        pre: ProgramPoint,
        count: u32,
    ) -> Vec<Evaluated>
    where
        F: Fn(SVal) -> (SVal, SVal),
    {
        let program = self.program;
        let states = self.states;
        let frame = pre.frame;
        let target_type = &program.expr(target).ty;
        let range = program.expr(id).range;

        let checked = self.run_checkers(vec![pred], pre, count, |checker, ctx| {
            checker.check_location(&location, false, target, ctx)
        });
        let mut evaluated = Vec::new();
        for node in checked {
            let state = self.state_of(node);
            let old = match location.as_loc() {
                Some(loc) => states.get_sval(&state, loc, target_type),
                None => SVal::Unknown,
            };
            let (stored, result) = update(old);
            for (node, state) in self.store_value(node, location.clone(), stored, range, pre, count) {
                evaluated.push(Evaluated::new(node, states.bind_expr(&state, frame, id, result.clone())));
            }
        }
        evaluated
    }

    /// Run the bind callbacks, then bind `value` at `location`.
    pub(crate) fn store_value(
        &mut self,
        pred: NodeId,
        location: SVal,
        value: SVal,
        range: SourceRange,
        pre: ProgramPoint,
        count: u32,
    ) -> Vec<(NodeId, ProgramStateRef)> {
        let states = self.states;
        let nodes = self.run_checkers(vec![pred], pre, count, |checker, ctx| {
            checker.check_bind(&location, &value, range, ctx)
        });
        nodes
            .into_iter()
            .map(|node| {
                let state = self.state_of(node);
                let state = match location.as_loc() {
                    Some(loc @ Loc::Region(_)) => states.bind_loc(&state, loc, value.clone()),
                    _ => state,
                };
                (node, state)
            })
            .collect()
    }

    /// `char s[] = "..."`: one binding per character, zero after the end.
    fn bind_string_contents(&self, state: ProgramStateRef, array: RegionId, text: &str) -> ProgramStateRef {
        let states = self.states;
        let regions = states.regions();
        let state = states.kill_binding(&state, array);
        let mut state = states.bind_default(&state, array, SVal::int(0));
        for (index, byte) in text.bytes().enumerate() {
            let element = regions.element_region(Type::Char, RegionIndex::Concrete(index as i64), array);
            state = states.bind_loc(&state, Loc::Region(element), states.svals().make_int(byte as i64, &Type::Char));
        }
        state
    }

    /// Region a brace-list entry initializes.
    fn init_target(&self, var: VarId, object: RegionId, path: &[InitStep]) -> RegionId {
        let program = self.program;
        let regions = self.states.regions();
        let mut ty = program.var(var).ty.clone();
        let mut region = object;
        for step in path {
            match step {
                InitStep::Element(index) => {
                    let element = ty.element_type().cloned().unwrap_or(Type::Int);
                    region = regions.element_region(element.clone(), RegionIndex::Concrete(*index), region);
                    ty = element;
                }
                InitStep::Field(field) => {
                    region = regions.field_region(*field, region);
                    ty = program.field(*field).ty.clone();
                }
            }
        }
        region
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::analyze_source;
    use crate::config::AnalyzerOptions;
    use test_log::test;

    fn descriptions(source: &str) -> Vec<String> {
        analyze_source(source, "test.c", &AnalyzerOptions::default())
            .unwrap()
            .diagnostics
            .into_iter()
            .map(|d| d.description)
            .collect()
    }

    #[test]
    fn test_compound_assignment_updates_the_variable() {
        let found = descriptions("int f(void) { int x = 6; x -= 6; return 10 / x; }");
        assert_eq!(found, vec!["Division by zero".to_string()]);
    }

    #[test]
    fn test_postfix_increment_yields_the_old_value() {
        let found = descriptions("int f(void) { int x = 0; int y = x++; return 10 / y; }");
        assert_eq!(found, vec!["Division by zero".to_string()]);
        assert!(descriptions("int f(void) { int x = 0; int y = ++x; return 10 / y; }").is_empty());
    }

    #[test]
    fn test_brace_initializer_zero_fills() {
        let found = descriptions("int f(void) { int a[3] = {1}; return 10 / a[2]; }");
        assert_eq!(found, vec!["Division by zero".to_string()]);
        assert!(descriptions("int f(void) { int a[3] = {1}; return 10 / a[0]; }").is_empty());
    }

    #[test]
    fn test_string_initializer_copies_characters() {
        assert!(descriptions("int f(void) { char s[] = \"ab\"; return 10 / s[1]; }").is_empty());
        let found = descriptions("int f(void) { char s[] = \"ab\"; return 10 / s[2]; }");
        assert_eq!(found, vec!["Division by zero".to_string()]);
    }

    #[test]
    fn test_pointer_arithmetic_through_arrays() {
        let found = descriptions("int f(void) { int a[2]; int *p = a; *(p + 1) = 0; return 10 / a[1]; }");
        assert_eq!(found, vec!["Division by zero".to_string()]);
    }
}
