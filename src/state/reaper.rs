//! Liveness of regions and symbols
//!
//! The [`SymbolReaper`] decides which parts of a state can still influence
//! the rest of the path. Marking starts from the roots the engine supplies
//! (live variables, expression values) and follows:
//!
//! - store bindings of live regions to the regions and symbols they hold
//! - symbolic regions to the symbols they are based on
//! - composite symbols to their operands
//!
//! Global memory, string literals and code are always live. Initial-value
//! symbols (`reg_$n<x>`) stay live as long as their region does.

use super::environment::Environment;
use crate::memory::{MemRegion, MemRegionManager, RegionId};
use crate::store::Store;
use crate::svals::{Loc, NonLoc, SVal, SymExpr, SymbolId, SymbolManager};
use rustc_hash::FxHashSet;

pub struct SymbolReaper<'a, 'p> {
    regions: &'a MemRegionManager<'p>,
    symbols: &'a SymbolManager,
    live_regions: FxHashSet<RegionId>,
    live_symbols: FxHashSet<SymbolId>,
}

impl<'a, 'p> SymbolReaper<'a, 'p> {
    pub fn new(regions: &'a MemRegionManager<'p>, symbols: &'a SymbolManager) -> Self {
        Self {
            regions,
            symbols,
            live_regions: FxHashSet::default(),
            live_symbols: FxHashSet::default(),
        }
    }

    pub fn mark_live_region(&mut self, region: RegionId) {
        let base = self.regions.base_region(region);
        if self.live_regions.insert(base) {
            if let MemRegion::Symbolic { symbol, .. } = self.regions.get(base) {
                self.mark_live_symbol(symbol);
            }
        }
    }

    pub fn mark_live_symbol(&mut self, symbol: SymbolId) {
        for dependency in self.symbols.dependencies(symbol) {
            self.live_symbols.insert(dependency);
        }
    }

    /// Mark everything `value` refers to.
    pub fn mark_value(&mut self, value: &SVal) {
        match value {
            SVal::Loc(Loc::Region(region)) | SVal::NonLoc(NonLoc::LocAsInteger(Loc::Region(region))) => {
                self.mark_live_region(*region);
            }
            SVal::NonLoc(NonLoc::Symbol(symbol)) => self.mark_live_symbol(*symbol),
            SVal::NonLoc(NonLoc::LazyCompound { store, region }) => {
                self.mark_live_region(*region);
                let base = self.regions.base_region(*region);
                let captured: Vec<SVal> = store
                    .iter()
                    .filter(|(key, _)| self.regions.base_region(key.region) == base)
                    .map(|(_, value)| value.clone())
                    .collect();
                for value in &captured {
                    self.mark_value(value);
                }
            }
            _ => {}
        }
    }

    /// Close the live set over the store and the environment.
    pub fn mark_reachable(&mut self, store: &Store, env: &Environment) {
        for (_, value) in env.iter() {
            self.mark_value(value);
        }
        let mut marked: FxHashSet<usize> = FxHashSet::default();
        loop {
            let mut changed = false;
            for (index, (key, value)) in store.iter().enumerate() {
                if marked.contains(&index) || !self.is_live_region(key.region) {
                    continue;
                }
                marked.insert(index);
                self.mark_value(value);
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }

    pub fn is_live_region(&self, region: RegionId) -> bool {
        let base = self.regions.base_region(region);
        if self.live_regions.contains(&base) {
            return true;
        }
        match self.regions.get(self.regions.memory_space(base)) {
            MemRegion::Globals(_) | MemRegion::CodeSpace => return true,
            _ => {}
        }
        match self.regions.get(base) {
            MemRegion::Symbolic { symbol, .. } => self.is_live_symbol(symbol),
            _ => false,
        }
    }

    pub fn is_live_symbol(&self, symbol: SymbolId) -> bool {
        if self.live_symbols.contains(&symbol) {
            return true;
        }
        match self.symbols.get(symbol) {
            SymExpr::RegionValue { region, .. } => self.is_live_region(region),
            SymExpr::Derived { parent, region, .. } => self.is_live_symbol(parent) || self.is_live_region(region),
            SymExpr::Conjured { .. } => false,
            SymExpr::SymInt { lhs, .. } => self.is_live_symbol(lhs),
            SymExpr::IntSym { rhs, .. } => self.is_live_symbol(rhs),
            SymExpr::SymSym { lhs, rhs, .. } => self.is_live_symbol(lhs) && self.is_live_symbol(rhs),
        }
    }

    pub fn is_dead_symbol(&self, symbol: SymbolId) -> bool {
        !self.is_live_symbol(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{build_program, ExprId, FrameId, LocationContextManager, VarId};
    use crate::frontend::ast::Type;
    use crate::frontend::parse_source;
    use crate::store::BindingKey;
    use test_log::test;

    #[test]
    fn test_reachability_through_bindings() {
        let program = build_program(&parse_source("int g; void f() { int *p; int *q; }").unwrap(), "test.c").unwrap();
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();

        let p = regions.var_region(VarId(1), frame);
        let q = regions.var_region(VarId(2), frame);
        let g = regions.var_region(VarId(0), frame);
        let held = symbols.conjured(ExprId(0), FrameId(0), Type::Int.pointer_to(), 0, None);
        let lost = symbols.conjured(ExprId(1), FrameId(0), Type::Int.pointer_to(), 0, None);
        let heap = regions.symbolic_heap_region(held);
        let inner = symbols.conjured(ExprId(2), FrameId(0), Type::Int, 0, None);

        let store = Store::new()
            .insert(BindingKey::direct(p), SVal::region(heap))
            .insert(BindingKey::direct(heap), SVal::symbol(inner))
            .insert(BindingKey::direct(q), SVal::region(regions.symbolic_heap_region(lost)));

        let mut reaper = SymbolReaper::new(&regions, &symbols);
        reaper.mark_live_region(p);
        reaper.mark_reachable(&store, &Environment::new());

        assert!(reaper.is_live_region(heap));
        assert!(reaper.is_live_symbol(held));
        assert!(reaper.is_live_symbol(inner));
        assert!(!reaper.is_live_region(q));
        assert!(reaper.is_dead_symbol(lost));
        assert!(reaper.is_live_region(g));
    }
}
