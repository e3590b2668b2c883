// core.UndefinedValue: garbage values used where a value matters

use super::{CallEvent, Checker, CheckerContext};
use crate::cfg::{CfgElement, ExprId, ExprKind, Program, VarId};
use crate::frontend::ast::{SourceLocation, SourceRange};
use crate::report::{BugReport, BugType};
use crate::svals::SVal;

const BRANCH: BugType = BugType::new("Branch condition evaluates to a garbage value", "Logic error");
const OPERATION: BugType = BugType::new("Result of operation is garbage or undefined", "Logic error");
const ASSIGNMENT: BugType = BugType::new("Assigned value is garbage or undefined", "Logic error");
const RETURN: BugType = BugType::new("Garbage return value", "Logic error");
const ARGUMENT: BugType = BugType::new("Uninitialized argument value", "Logic error");

pub struct UndefinedValueChecker;

/// Variable an rvalue was read from, looking through conversions.
fn loaded_var(program: &Program, expr: ExprId) -> Option<VarId> {
    match &program.expr(expr).kind {
        ExprKind::Cast { operand } => loaded_var(program, *operand),
        ExprKind::Load(inner) => match program.expr(*inner).kind {
            ExprKind::VarRef(var) => Some(var),
            _ => None,
        },
        _ => None,
    }
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

impl UndefinedValueChecker {
    fn report(
        &self,
        ctx: &mut CheckerContext<'_, '_, '_>,
        bug_type: BugType,
        description: String,
        location: SourceLocation,
        culprit: Option<ExprId>,
    ) {
        let state = ctx.state();
        let node = ctx.generate_sink(state);
        let program = ctx.program();
        let mut report = BugReport::new(bug_type, description, node, location);
        if let Some(expr) = culprit {
            report.add_range(program.expr(expr).range);
            if let Some(var) = loaded_var(program, expr) {
                report.mark_interesting_region(ctx.states().regions().var_region(var, ctx.frame()));
            }
        }
        ctx.emit_report(report);
    }

    /// Value currently stored where the lvalue `target` points.
    fn stored_value(&self, ctx: &CheckerContext<'_, '_, '_>, target: ExprId) -> SVal {
        match ctx.expr_value(target).as_loc() {
            Some(loc) => ctx.states().get_sval(&ctx.state(), loc, &ctx.program().expr(target).ty),
            None => SVal::Unknown,
        }
    }
}

impl Checker for UndefinedValueChecker {
    fn name(&self) -> &'static str {
        "core.UndefinedValue"
    }

    fn check_pre_stmt(&self, element: &CfgElement, ctx: &mut CheckerContext<'_, '_, '_>) {
        let program = ctx.program();
        match element {
            CfgElement::Expr { expr, .. } => {
                let location = program.expr(*expr).location();
                match &program.expr(*expr).kind {
                    ExprKind::Binary { op, lhs, rhs } => {
                        let side = if ctx.expr_value(*lhs).is_undef() {
                            Some(("left", *lhs))
                        } else if ctx.expr_value(*rhs).is_undef() {
                            Some(("right", *rhs))
                        } else {
                            None
                        };
                        if let Some((side, operand)) = side {
                            let description =
                                format!("The {} operand of '{}' is a garbage value", side, op.symbol());
                            self.report(ctx, OPERATION, description, location, Some(operand));
                        }
                    }
                    ExprKind::CompoundAssign { target, .. } if self.stored_value(ctx, *target).is_undef() => {
                        let description = "The left expression of the compound assignment is an uninitialized \
                                           value. The computed value will also be garbage"
                            .to_string();
                        self.report(ctx, OPERATION, description, location, None);
                    }
                    ExprKind::IncDec { target, .. } if self.stored_value(ctx, *target).is_undef() => {
                        let description =
                            "The expression is an uninitialized value. The computed value will also be garbage"
                                .to_string();
                        self.report(ctx, OPERATION, description, location, None);
                    }
                    _ => {}
                }
            }
            CfgElement::Return {
                value: Some(value),
                location,
            } if ctx.expr_value(*value).is_undef() => {
                let description = "Undefined or garbage value returned to caller".to_string();
                self.report(ctx, RETURN, description, *location, Some(*value));
            }
            _ => {}
        }
    }

    fn check_pre_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) {
        let Some(index) = call.args.iter().position(SVal::is_undef) else { return };
        let argument = call.arg_exprs[index];
        let description = format!("{} function call argument is an uninitialized value", ordinal(index + 1));
        let location = ctx.program().expr(argument).location();
        self.report(ctx, ARGUMENT, description, location, Some(argument));
    }

    fn check_bind(&self, _location: &SVal, value: &SVal, range: SourceRange, ctx: &mut CheckerContext<'_, '_, '_>) {
        if value.is_undef() {
            let description = "Assigned value is garbage or undefined".to_string();
            let state = ctx.state();
            let node = ctx.generate_sink(state);
            let mut report = BugReport::new(ASSIGNMENT, description, node, range.begin);
            report.add_range(range);
            ctx.emit_report(report);
        }
    }

    fn check_branch_condition(&self, cond: ExprId, ctx: &mut CheckerContext<'_, '_, '_>) {
        if ctx.expr_value(cond).is_undef() {
            let description = "Branch condition evaluates to a garbage value".to_string();
            let location = ctx.program().expr(cond).location();
            self.report(ctx, BRANCH, description, location, Some(cond));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals() {
        let words: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22].iter().map(|n| ordinal(*n)).collect();
        assert_eq!(words, ["1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd"]);
    }
}
