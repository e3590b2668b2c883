//! Checkers
//!
//! A checker watches the engine through a fixed set of callbacks and may
//! narrow the state of a path, end it, or report a bug:
//!
//! ```text
//! element ─ check_pre_stmt ─ (check_location, check_bind) ─ check_post_stmt
//! call    ─ check_pre_call ─ eval_call | inline | conservative ─ check_post_call
//! branch  ─ check_branch_condition
//! block   ─ check_dead_symbols
//! exit    ─ check_end_function
//! ```
//!
//! Every callback gets a [`CheckerContext`] positioned at the current node.
//! Checkers are stateless: whatever they track lives in the program state
//! through [`ProgramStateTrait`](crate::state::ProgramStateTrait), so one
//! [`CheckerManager`] can serve analyses running on several threads.

pub mod context;
pub mod divide_zero;
pub mod malloc;
pub mod no_return;
pub mod null_dereference;
pub mod stack_address_escape;
pub mod undefined_value;

pub use context::CheckerContext;
pub use divide_zero::DivideZeroChecker;
pub use malloc::MallocChecker;
pub use no_return::NoReturnFunctionChecker;
pub use null_dereference::NullDereferenceChecker;
pub use stack_address_escape::StackAddressEscapeChecker;
pub use undefined_value::UndefinedValueChecker;

use crate::cfg::{CallSite, CfgElement, ExprId, FrameId, FunctionId};
use crate::config::ConfigError;
use crate::frontend::ast::SourceRange;
use crate::state::SymbolReaper;
use crate::svals::{SVal, SymbolId};

/// Names accepted in [`AnalyzerOptions::checkers`](crate::config::AnalyzerOptions::checkers)
pub const BUILTIN_CHECKERS: &[&str] = &[
    "core.NullDereference",
    "core.UndefinedValue",
    "core.DivideZero",
    "core.StackAddressEscape",
    "unix.Malloc",
    "core.NoReturnFunctions",
];

/// A call about to be evaluated, or just evaluated
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub expr: ExprId,
    pub callee: FunctionId,
    pub name: String,
    /// Argument values, after conversion to the parameter types
    pub args: Vec<SVal>,
    pub arg_exprs: Vec<ExprId>,
    /// Frame of the caller
    pub frame: FrameId,
    pub site: CallSite,
    /// Whether the engine modelled the call by invalidation
    pub conservative: bool,
    /// Symbols that were bound in memory the call invalidated
    pub invalidated: Vec<SymbolId>,
}

impl CallEvent {
    pub fn arg(&self, index: usize) -> Option<&SVal> {
        self.args.get(index)
    }

    pub fn arg_range(&self, program: &crate::cfg::Program, index: usize) -> Option<SourceRange> {
        self.arg_exprs.get(index).map(|e| program.expr(*e).range)
    }
}

#[allow(unused_variables)]
pub trait Checker: Send + Sync {
    fn name(&self) -> &'static str;

    fn check_pre_stmt(&self, element: &CfgElement, ctx: &mut CheckerContext<'_, '_, '_>) {}

    fn check_post_stmt(&self, element: &CfgElement, ctx: &mut CheckerContext<'_, '_, '_>) {}

    fn check_pre_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) {}

    fn check_post_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) {}

    /// A read (`is_load`) or write through `location`; `lvalue` is the
    /// expression that produced it.
    fn check_location(&self, location: &SVal, is_load: bool, lvalue: ExprId, ctx: &mut CheckerContext<'_, '_, '_>) {}

    /// `value` is about to be stored at `location`.
    fn check_bind(&self, location: &SVal, value: &SVal, range: SourceRange, ctx: &mut CheckerContext<'_, '_, '_>) {}

    fn check_branch_condition(&self, cond: ExprId, ctx: &mut CheckerContext<'_, '_, '_>) {}

    /// The frame is about to return (or the top-level path ends).
    fn check_end_function(&self, ctx: &mut CheckerContext<'_, '_, '_>) {}

    /// Symbols the reaper found dead are about to be dropped from the state.
    fn check_dead_symbols(&self, reaper: &SymbolReaper<'_, '_>, ctx: &mut CheckerContext<'_, '_, '_>) {}

    /// Model the call instead of the engine; returns whether it did.
    fn eval_call(&self, call: &CallEvent, ctx: &mut CheckerContext<'_, '_, '_>) -> bool {
        false
    }
}

/// The enabled checkers, in the order they run
#[derive(Default)]
pub struct CheckerManager {
    checkers: Vec<Box<dyn Checker>>,
}

impl std::fmt::Debug for CheckerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.checkers.iter().map(|c| c.name())).finish()
    }
}

impl CheckerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, checker: Box<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Checker> {
        self.checkers.iter().map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Built-in checkers by registry name, in the given order.
    pub fn from_names(names: &[String]) -> Result<Self, ConfigError> {
        let mut manager = CheckerManager::new();
        for name in names {
            let checker: Box<dyn Checker> = match name.as_str() {
                "core.NullDereference" => Box::new(NullDereferenceChecker),
                "core.UndefinedValue" => Box::new(UndefinedValueChecker),
                "core.DivideZero" => Box::new(DivideZeroChecker),
                "core.StackAddressEscape" => Box::new(StackAddressEscapeChecker),
                "unix.Malloc" => Box::new(MallocChecker),
                "core.NoReturnFunctions" => Box::new(NoReturnFunctionChecker),
                other => return Err(ConfigError::UnknownChecker(other.to_string())),
            };
            manager.register(checker);
        }
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_is_constructible() {
        let names: Vec<String> = BUILTIN_CHECKERS.iter().map(|n| n.to_string()).collect();
        let manager = CheckerManager::from_names(&names).unwrap();
        let registered: Vec<&str> = manager.iter().map(|c| c.name()).collect();
        assert_eq!(registered, BUILTIN_CHECKERS);
    }

    #[test]
    fn test_unknown_checker_is_rejected() {
        let result = CheckerManager::from_names(&["alpha.Nothing".to_string()]);
        assert!(matches!(result, Err(ConfigError::UnknownChecker(name)) if name == "alpha.Nothing"));
    }
}
