// core.StackAddressEscape: stack addresses that outlive their frame

use super::{Checker, CheckerContext};
use crate::cfg::{CfgElement, FrameId, Program, VarKind};
use crate::memory::{MemRegion, MemRegionManager, RegionId};
use crate::report::{BugReport, BugType};

const RETURNED: BugType = BugType::new("Return of address to stack-allocated memory", "Logic error");
const STORED_TO_GLOBAL: BugType = BugType::new("Stack address stored into global variable", "Logic error");

pub struct StackAddressEscapeChecker;

/// "stack memory associated with local variable 'x'", for regions on the
/// stack of `frame`.
fn describe_stack_memory(program: &Program, regions: &MemRegionManager<'_>, region: RegionId, frame: FrameId) -> Option<String> {
    if regions.stack_frame(region) != Some(frame) {
        return None;
    }
    Some(match regions.get(regions.base_region(region)) {
        MemRegion::Var { var, .. } => {
            let decl = program.var(var);
            let kind = match decl.kind {
                VarKind::Param(_) => "parameter",
                _ => "local variable",
            };
            format!("stack memory associated with {} '{}'", kind, decl.name)
        }
        MemRegion::Alloca { expr, .. } => format!(
            "stack memory allocated by call to alloca() on line {}",
            program.expr(expr).location().line
        ),
        _ => "stack memory".to_string(),
    })
}

impl Checker for StackAddressEscapeChecker {
    fn name(&self) -> &'static str {
        "core.StackAddressEscape"
    }

    fn check_pre_stmt(&self, element: &CfgElement, ctx: &mut CheckerContext<'_, '_, '_>) {
        let CfgElement::Return {
            value: Some(value),
            location,
        } = element
        else {
            return;
        };
        let Some(region) = ctx.expr_value(*value).as_region() else { return };
        let program = ctx.program();
        let regions = ctx.states().regions();
        let Some(memory) = describe_stack_memory(program, regions, region, ctx.frame()) else { return };

        let state = ctx.state();
        let node = ctx.generate_sink(state);
        let mut report = BugReport::new(
            RETURNED,
            format!("Address of {} returned to caller", memory),
            node,
            *location,
        );
        report.add_range(program.expr(*value).range);
        ctx.emit_report(report);
    }

    fn check_end_function(&self, ctx: &mut CheckerContext<'_, '_, '_>) {
        let state = ctx.state();
        let program = ctx.program();
        let regions = ctx.states().regions();
        let frame = ctx.frame();

        let escapes: Vec<(String, String)> = state
            .store
            .iter()
            .filter(|(key, _)| regions.has_global_storage(key.region))
            .filter_map(|(key, value)| {
                let memory = describe_stack_memory(program, regions, value.as_region()?, frame)?;
                let global = regions.describe(key.region)?;
                Some((memory, global))
            })
            .collect();
        if escapes.is_empty() {
            return;
        }

        let location = ctx.location().unwrap_or_default();
        let node = ctx.generate_error_node(state);
        for (memory, global) in escapes {
            let description = format!(
                "Address of {} is still referred to by the global variable '{}' upon returning to the caller.  \
                 This will be a dangling reference",
                memory, global
            );
            ctx.emit_report(BugReport::new(STORED_TO_GLOBAL, description, node, location));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{build_program, LocationContextManager, VarId};
    use crate::frontend::parse_source;

    #[test]
    fn test_stack_memory_descriptions() {
        let program = build_program(&parse_source("int g; int *f(int n) { int x; return &x; }").unwrap(), "test.c").unwrap();
        let frames = LocationContextManager::new();
        let top = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);

        let n = regions.var_region(VarId(1), top);
        let x = regions.var_region(VarId(2), top);
        let g = regions.var_region(VarId(0), top);
        assert_eq!(
            describe_stack_memory(&program, &regions, x, top).as_deref(),
            Some("stack memory associated with local variable 'x'")
        );
        assert_eq!(
            describe_stack_memory(&program, &regions, n, top).as_deref(),
            Some("stack memory associated with parameter 'n'")
        );
        assert_eq!(describe_stack_memory(&program, &regions, g, top), None);
    }
}
