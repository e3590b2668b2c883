// core.NullDereference: reads and writes through null or garbage pointers

use super::{Checker, CheckerContext};
use crate::cfg::{ExprId, ExprKind, Program, VarId};
use crate::report::{BugReport, BugType};
use crate::state::ProgramStateRef;
use crate::svals::SVal;

const NULL_DEREF: BugType = BugType::new("Dereference of null pointer", "Logic error");
const UNDEF_DEREF: BugType = BugType::new("Dereference of undefined pointer value", "Logic error");

pub struct NullDereferenceChecker;

/// The pointer expression dereferenced by `lvalue`, and the variable it
/// was loaded from.
fn dereferenced_pointer(program: &Program, lvalue: ExprId) -> Option<(ExprId, Option<VarId>)> {
    let pointer = match &program.expr(lvalue).kind {
        ExprKind::Deref(pointer) => *pointer,
        ExprKind::Index { base, .. } => *base,
        ExprKind::Member { base, .. } => match &program.expr(*base).kind {
            ExprKind::Deref(pointer) => *pointer,
            _ => return None,
        },
        _ => return None,
    };
    let mut current = pointer;
    loop {
        match &program.expr(current).kind {
            ExprKind::Cast { operand } => current = *operand,
            ExprKind::Load(inner) => {
                return Some(match program.expr(*inner).kind {
                    ExprKind::VarRef(var) => (pointer, Some(var)),
                    _ => (pointer, None),
                })
            }
            _ => return Some((pointer, None)),
        }
    }
}

fn null_message(program: &Program, lvalue: ExprId, var: Option<&str>) -> String {
    match (&program.expr(lvalue).kind, var) {
        (ExprKind::Index { .. }, Some(name)) => {
            format!("Array access (from variable '{}') results in a null pointer dereference", name)
        }
        (ExprKind::Index { .. }, None) => "Array access results in a null pointer dereference".to_string(),
        (ExprKind::Member { field, .. }, Some(name)) => format!(
            "Access to field '{}' results in a dereference of a null pointer (loaded from variable '{}')",
            program.field(*field).name,
            name
        ),
        (ExprKind::Member { field, .. }, None) => format!(
            "Access to field '{}' results in a dereference of a null pointer",
            program.field(*field).name
        ),
        (_, Some(name)) => format!("Dereference of null pointer (loaded from variable '{}')", name),
        (_, None) => "Dereference of null pointer".to_string(),
    }
}

impl NullDereferenceChecker {
    fn report(
        &self,
        ctx: &mut CheckerContext<'_, '_, '_>,
        state: ProgramStateRef,
        bug_type: BugType,
        description: String,
        lvalue: ExprId,
    ) {
        let node = ctx.generate_sink(state);
        let program = ctx.program();
        let mut report = BugReport::new(bug_type, description, node, program.expr(lvalue).location());
        if let Some((pointer, var)) = dereferenced_pointer(program, lvalue) {
            report.add_range(program.expr(pointer).range);
            if let Some(var) = var {
                report.mark_interesting_region(ctx.states().regions().var_region(var, ctx.frame()));
            }
        }
        ctx.emit_report(report);
    }
}

impl Checker for NullDereferenceChecker {
    fn name(&self) -> &'static str {
        "core.NullDereference"
    }

    fn check_location(&self, location: &SVal, _is_load: bool, lvalue: ExprId, ctx: &mut CheckerContext<'_, '_, '_>) {
        let state = ctx.state();
        if location.is_undef() {
            let description = "Dereference of undefined pointer value".to_string();
            self.report(ctx, state, UNDEF_DEREF, description, lvalue);
            return;
        }
        if location.as_loc().is_none() {
            return;
        }

        let outcome = ctx.states().assume_dual(&state, location);
        match outcome {
            (None, Some(null_state)) => {
                let program = ctx.program();
                let var = dereferenced_pointer(program, lvalue).and_then(|(_, var)| var);
                let name = var.map(|var| program.var(var).name.clone());
                let description = null_message(program, lvalue, name.as_deref());
                self.report(ctx, null_state, NULL_DEREF, description, lvalue);
            }
            // the access itself proves the pointer was not null
            (Some(non_null), _) => {
                ctx.add_transition(non_null);
            }
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_program;
    use crate::frontend::parse_source;

    #[test]
    fn test_messages_name_the_pointer_variable() {
        let source = "struct S { int f; };\nvoid a(int *p) { *p = 1; }\nvoid b(struct S *s) { s->f = 1; }\nvoid c(int *q) { q[0] = 1; }";
        let program = build_program(&parse_source(source).unwrap(), "test.c").unwrap();
        let lvalues: Vec<ExprId> = program
            .exprs
            .iter()
            .filter_map(|e| match e.kind {
                ExprKind::Assign { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        let messages: Vec<String> = lvalues
            .iter()
            .map(|lvalue| {
                let var = dereferenced_pointer(&program, *lvalue).and_then(|(_, var)| var);
                let name = var.map(|v| program.var(v).name.clone());
                null_message(&program, *lvalue, name.as_deref())
            })
            .collect();
        assert_eq!(
            messages,
            vec![
                "Dereference of null pointer (loaded from variable 'p')",
                "Access to field 'f' results in a dereference of a null pointer (loaded from variable 's')",
                "Array access (from variable 'q') results in a null pointer dereference",
            ]
        );
    }
}
