//! Program states and their manager
//!
//! A [`ProgramState`] is the abstract state of one path at one point:
//!
//! ```text
//! ProgramState ─┬─ Environment     expression values of the current statement
//!               ├─ Store           memory contents
//!               ├─ ConstraintSet   value ranges of symbols
//!               └─ GenericDataMap  checker-private facts
//! ```
//!
//! States are immutable. Every transformation goes through the
//! [`ProgramStateManager`], which interns the result: two equal states are
//! the same [`ProgramStateRef`], so the exploded graph compares states by
//! pointer.

use super::constraints::{ConstraintSet, RangeConstraintManager};
use super::environment::Environment;
use super::reaper::SymbolReaper;
use super::traits::{GenericDataMap, ProgramStateTrait};
use crate::cfg::{ExprId, FrameId};
use crate::frontend::ast::Type;
use crate::memory::{MemRegionManager, RegionId};
use crate::store::{Invalidation, Store, StoreManager};
use crate::svals::{Loc, SVal, SValBuilder, SymbolId, SymbolManager};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProgramState {
    pub env: Environment,
    pub store: Store,
    pub constraints: ConstraintSet,
    pub gdm: GenericDataMap,
}

impl ProgramState {
    pub fn get<T: ProgramStateTrait>(&self, key: &T::Key) -> Option<T::Value> {
        self.gdm.get::<T>(key)
    }

    pub fn entries<T: ProgramStateTrait>(&self) -> Vec<(T::Key, T::Value)> {
        self.gdm.entries::<T>()
    }
}

/// Handle to an interned [`ProgramState`]
#[derive(Debug, Clone)]
pub struct ProgramStateRef(Rc<ProgramState>);

impl Deref for ProgramStateRef {
    type Target = ProgramState;

    fn deref(&self) -> &ProgramState {
        &self.0
    }
}

impl PartialEq for ProgramStateRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ProgramStateRef {}

impl Hash for ProgramStateRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// Result of asking whether a value is null or zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

pub struct ProgramStateManager<'a, 'p> {
    svals: SValBuilder<'a, 'p>,
    store_manager: Box<dyn StoreManager>,
    constraints: RangeConstraintManager,
    states: RefCell<FxHashMap<ProgramState, ProgramStateRef>>,
}

impl<'a, 'p> ProgramStateManager<'a, 'p> {
    pub fn new(
        regions: &'a MemRegionManager<'p>,
        symbols: &'a SymbolManager,
        store_manager: Box<dyn StoreManager>,
    ) -> Self {
        Self {
            svals: SValBuilder::new(regions, symbols),
            store_manager,
            constraints: RangeConstraintManager::new(),
            states: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn svals(&self) -> &SValBuilder<'a, 'p> {
        &self.svals
    }

    pub fn regions(&self) -> &'a MemRegionManager<'p> {
        self.svals.regions()
    }

    pub fn symbols(&self) -> &'a SymbolManager {
        self.svals.symbols()
    }

    pub fn store_manager(&self) -> &dyn StoreManager {
        self.store_manager.as_ref()
    }

    /// Number of distinct states created so far.
    pub fn len(&self) -> usize {
        self.states.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn intern(&self, state: ProgramState) -> ProgramStateRef {
        if let Some(existing) = self.states.borrow().get(&state) {
            return existing.clone();
        }
        let handle = ProgramStateRef(Rc::new(state.clone()));
        self.states.borrow_mut().insert(state, handle.clone());
        handle
    }

    pub fn initial_state(&self) -> ProgramStateRef {
        self.intern(ProgramState::default())
    }

    fn with(&self, state: &ProgramStateRef, update: impl FnOnce(&mut ProgramState)) -> ProgramStateRef {
        let mut next = ProgramState::clone(state);
        update(&mut next);
        if next == **state {
            return state.clone();
        }
        self.intern(next)
    }

    // ===== Environment =====

    /// Value of an evaluated expression; `Unknown` if it was never bound.
    pub fn expr_value(&self, state: &ProgramStateRef, frame: FrameId, expr: ExprId) -> SVal {
        state.env.get(frame, expr).cloned().unwrap_or(SVal::Unknown)
    }

    pub fn bind_expr(&self, state: &ProgramStateRef, frame: FrameId, expr: ExprId, value: SVal) -> ProgramStateRef {
        self.with(state, |s| s.env = s.env.bind(frame, expr, value))
    }

    pub fn bind_return_value(&self, state: &ProgramStateRef, frame: FrameId, value: SVal) -> ProgramStateRef {
        self.with(state, |s| s.env = s.env.bind_return_value(frame, value))
    }

    pub fn clear_expressions(&self, state: &ProgramStateRef, frame: FrameId) -> ProgramStateRef {
        self.with(state, |s| s.env = s.env.clear_expressions(frame))
    }

    pub fn remove_frame(&self, state: &ProgramStateRef, frame: FrameId) -> ProgramStateRef {
        self.with(state, |s| s.env = s.env.remove_frame(frame))
    }

    // ===== Store =====

    pub fn get_sval(&self, state: &ProgramStateRef, loc: Loc, ty: &Type) -> SVal {
        self.store_manager.retrieve(&self.svals, &state.store, loc, ty)
    }

    pub fn bind_loc(&self, state: &ProgramStateRef, loc: Loc, value: SVal) -> ProgramStateRef {
        let store = self.store_manager.bind(&self.svals, &state.store, loc, value);
        self.with(state, |s| s.store = store)
    }

    pub fn bind_default(&self, state: &ProgramStateRef, region: RegionId, value: SVal) -> ProgramStateRef {
        let store = self.store_manager.bind_default(&self.svals, &state.store, region, value);
        self.with(state, |s| s.store = store)
    }

    pub fn kill_binding(&self, state: &ProgramStateRef, region: RegionId) -> ProgramStateRef {
        let store = self.store_manager.kill_binding(&self.svals, &state.store, region);
        self.with(state, |s| s.store = store)
    }

    /// Replace everything reachable from the requested regions with fresh
    /// symbols. Returns the new state and the symbols that were overwritten.
    pub fn invalidate_regions(&self, state: &ProgramStateRef, request: &Invalidation) -> (ProgramStateRef, Vec<SymbolId>) {
        let result = self.store_manager.invalidate_regions(&self.svals, &state.store, request);
        (self.with(state, |s| s.store = result.store), result.symbols)
    }

    pub fn cast_region(&self, region: RegionId, ty: &Type) -> RegionId {
        self.store_manager.cast_region(&self.svals, region, ty)
    }

    // ===== Constraints =====

    pub fn assume(&self, state: &ProgramStateRef, cond: &SVal, assumption: bool) -> Option<ProgramStateRef> {
        let constraints = self.constraints.assume(&self.svals, &state.constraints, cond, assumption)?;
        Some(self.with(state, |s| s.constraints = constraints))
    }

    pub fn assume_dual(&self, state: &ProgramStateRef, cond: &SVal) -> (Option<ProgramStateRef>, Option<ProgramStateRef>) {
        (self.assume(state, cond, true), self.assume(state, cond, false))
    }

    /// Concrete value of `value` on this path, if it has one.
    pub fn known_value(&self, state: &ProgramStateRef, value: &SVal) -> Option<i64> {
        match value.as_symbol() {
            Some(symbol) => self.constraints.get_sym_val(&self.svals, &state.constraints, symbol),
            None => value.as_concrete_int(),
        }
    }

    /// Whether `value` is zero (or null) on every, no, or some paths.
    pub fn is_zero(&self, state: &ProgramStateRef, value: &SVal) -> Truth {
        match self.assume_dual(state, value) {
            (Some(_), Some(_)) | (None, None) => Truth::Unknown,
            (Some(_), None) => Truth::False,
            (None, Some(_)) => Truth::True,
        }
    }

    // ===== Checker data =====

    pub fn set<T: ProgramStateTrait>(&self, state: &ProgramStateRef, key: &T::Key, value: &T::Value) -> ProgramStateRef {
        self.with(state, |s| s.gdm = s.gdm.set::<T>(key, value))
    }

    pub fn remove<T: ProgramStateTrait>(&self, state: &ProgramStateRef, key: &T::Key) -> ProgramStateRef {
        self.with(state, |s| s.gdm = s.gdm.remove::<T>(key))
    }

    // ===== Garbage collection =====

    /// Drop bindings and constraints the reaper found dead.
    pub fn remove_dead(&self, state: &ProgramStateRef, reaper: &SymbolReaper<'_, '_>) -> ProgramStateRef {
        let store = self.store_manager.remove_dead_bindings(&state.store, reaper);
        let constraints = self.constraints.remove_dead(&state.constraints, reaper);
        self.with(state, |s| {
            s.store = store;
            s.constraints = constraints;
        })
    }

    /// Human-readable dump for trace logs.
    pub fn dump(&self, state: &ProgramStateRef) -> String {
        let regions = self.regions();
        let symbols = self.symbols();
        let mut out = String::new();
        let _ = writeln!(out, "Store:");
        for (key, value) in state.store.iter() {
            let _ = writeln!(out, "  {} ({:?}): {}", regions.dump(key.region), key.kind, self.dump_value(value));
        }
        let _ = writeln!(out, "Constraints:");
        for (symbol, ranges) in state.constraints.iter() {
            let _ = writeln!(out, "  {} : {}", symbols.dump(*symbol, regions), ranges);
        }
        out
    }

    pub fn dump_value(&self, value: &SVal) -> String {
        let regions = self.regions();
        match value {
            SVal::Undefined => "Undefined".to_string(),
            SVal::Unknown => "Unknown".to_string(),
            SVal::Loc(Loc::Region(region)) => format!("&{}", regions.dump(*region)),
            SVal::Loc(Loc::ConcreteInt(n)) => format!("{} (Loc)", n),
            SVal::NonLoc(crate::svals::NonLoc::ConcreteInt(n)) => n.to_string(),
            SVal::NonLoc(crate::svals::NonLoc::Symbol(symbol)) => self.symbols().dump(*symbol, regions),
            SVal::NonLoc(crate::svals::NonLoc::LocAsInteger(loc)) => {
                format!("{} [as integer]", self.dump_value(&SVal::Loc(*loc)))
            }
            SVal::NonLoc(crate::svals::NonLoc::LazyCompound { region, .. }) => {
                format!("lazyCompoundVal{{{}}}", regions.dump(*region))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{build_program, LocationContextManager, VarId};
    use crate::frontend::ast::BinOp;
    use crate::frontend::parse_source;
    use crate::store::RegionStoreManager;
    use test_log::test;

    #[test]
    fn test_states_are_interned() {
        let program = build_program(&parse_source("void f(int a) { int x; }").unwrap(), "test.c").unwrap();
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let states = ProgramStateManager::new(&regions, &symbols, Box::new(RegionStoreManager::new()));

        let x = Loc::Region(regions.var_region(VarId(1), frame));
        let initial = states.initial_state();
        let one = states.bind_loc(&initial, x, SVal::int(1));
        let again = states.bind_loc(&initial, x, SVal::int(1));
        assert_eq!(one, again);
        assert_ne!(one, initial);
        // rebinding the same value is the same state
        assert_eq!(states.bind_loc(&one, x, SVal::int(1)), one);
        assert_eq!(states.get_sval(&one, x, &Type::Int), SVal::int(1));
        assert_eq!(states.get_sval(&initial, x, &Type::Int), SVal::Undefined);
    }

    #[test]
    fn test_assumptions_fork_states() {
        let program = build_program(&parse_source("void f(int a) { }").unwrap(), "test.c").unwrap();
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let states = ProgramStateManager::new(&regions, &symbols, Box::new(RegionStoreManager::new()));

        let initial = states.initial_state();
        let a = states.get_sval(&initial, Loc::Region(regions.var_region(VarId(0), frame)), &Type::Int);
        let cond = states.svals().eval_binop(BinOp::Eq, a.clone(), SVal::int(3), &Type::Int);

        let (yes, no) = states.assume_dual(&initial, &cond);
        let yes = yes.unwrap();
        let no = no.unwrap();
        assert_ne!(yes, no);
        assert_eq!(states.known_value(&yes, &a), Some(3));
        assert_eq!(states.known_value(&no, &a), None);
        assert_eq!(states.is_zero(&yes, &a), Truth::False);
        assert_eq!(states.is_zero(&initial, &a), Truth::Unknown);
        assert_eq!(states.is_zero(&initial, &SVal::null()), Truth::True);
    }
}
