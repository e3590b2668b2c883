// core.NoReturnFunctions: paths end at calls that never return

use super::{CallEvent, Checker, CheckerContext};

const NO_RETURN: &[&str] = &["exit", "abort", "_Exit", "__assert_fail"];

pub struct NoReturnFunctionChecker;

impl Checker for NoReturnFunctionChecker {
    fn name(&self) -> &'static str {
        "core.NoReturnFunctions"
    }

    fn eval_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) -> bool {
        if !NO_RETURN.contains(&call.name.as_str()) {
            return false;
        }
        let state = ctx.state();
        ctx.generate_sink(state);
        true
    }
}
