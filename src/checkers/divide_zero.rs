// core.DivideZero

use super::{Checker, CheckerContext};
use crate::cfg::{CfgElement, ExprKind};
use crate::frontend::ast::BinOp;
use crate::report::{BugReport, BugType};
use crate::state::Truth;

const DIVIDE_ZERO: BugType = BugType::new("Division by zero", "Logic error");

pub struct DivideZeroChecker;

impl Checker for DivideZeroChecker {
    fn name(&self) -> &'static str {
        "core.DivideZero"
    }

    fn check_pre_stmt(&self, element: &CfgElement, ctx: &mut CheckerContext<'_, '_, '_>) {
        let CfgElement::Expr { expr, .. } = element else { return };
        let program = ctx.program();
        let divisor = match &program.expr(*expr).kind {
            ExprKind::Binary {
                op: BinOp::Div | BinOp::Rem,
                rhs,
                ..
            }
            | ExprKind::CompoundAssign {
                op: BinOp::Div | BinOp::Rem,
                value: rhs,
                ..
            } => *rhs,
            _ => return,
        };
        let value = ctx.expr_value(divisor);
        if value.is_unknown_or_undef() {
            return;
        }

        let state = ctx.state();
        match ctx.states().is_zero(&state, &value) {
            Truth::True => {
                let node = ctx.generate_sink(state);
                let mut report = BugReport::new(DIVIDE_ZERO, "Division by zero", node, program.expr(*expr).location());
                report.add_range(program.expr(divisor).range);
                ctx.emit_report(report);
            }
            Truth::Unknown => {
                if let Some(non_zero) = ctx.states().assume(&state, &value, true) {
                    ctx.add_transition(non_zero);
                }
            }
            Truth::False => {}
        }
    }
}
