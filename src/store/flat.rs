// Variable-granularity store: one binding per variable, nothing finer

use super::{conjure_contents, fit_to_type, BindingKey, Invalidation, InvalidationResult, Store, StoreManager};
use crate::frontend::ast::Type;
use crate::memory::{MemRegion, RegionId};
use crate::svals::{Loc, SVal, SValBuilder};
use rustc_hash::FxHashSet;

/// Tracks scalar variables only. Reads of fields, elements and pointees
/// are `Unknown` and writes to them are dropped.
#[derive(Debug, Default)]
pub struct FlatStoreManager;

impl FlatStoreManager {
    pub fn new() -> Self {
        Self
    }

    fn tracked(&self, svals: &SValBuilder<'_, '_>, region: RegionId) -> bool {
        let regions = svals.regions();
        matches!(regions.get(region), MemRegion::Var { .. })
            && regions.value_type(region).is_some_and(|ty| ty.is_scalar())
    }
}

impl StoreManager for FlatStoreManager {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn retrieve(&self, svals: &SValBuilder<'_, '_>, store: &Store, loc: Loc, ty: &Type) -> SVal {
        let Loc::Region(region) = loc else {
            return SVal::Unknown;
        };
        if !self.tracked(svals, region) {
            log::trace!("flat store does not track {}", svals.regions().dump(region));
            return SVal::Unknown;
        }
        if let Some(value) = store.direct(region) {
            return fit_to_type(value.clone(), ty);
        }
        if svals.regions().has_stack_non_parameters_storage(region) {
            SVal::Undefined
        } else {
            svals.region_value(region, ty)
        }
    }

    fn bind(&self, svals: &SValBuilder<'_, '_>, store: &Store, loc: Loc, value: SVal) -> Store {
        match loc {
            Loc::Region(region) if self.tracked(svals, region) => store.insert(BindingKey::direct(region), value),
            _ => store.clone(),
        }
    }

    fn bind_default(&self, _svals: &SValBuilder<'_, '_>, store: &Store, _region: RegionId, _value: SVal) -> Store {
        store.clone()
    }

    fn invalidate_regions(
        &self,
        svals: &SValBuilder<'_, '_>,
        store: &Store,
        request: &Invalidation,
    ) -> InvalidationResult {
        let regions = svals.regions();
        let mut roots: Vec<RegionId> = request.regions.iter().map(|r| regions.base_region(*r)).collect();
        if request.include_globals {
            let program = regions.program();
            roots.extend(program.global_vars().map(|var| regions.var_region(var, request.frame)));
        }

        let mut seen = FxHashSet::default();
        let mut result = store.clone();
        let mut symbols = Vec::new();
        let mut invalidated = Vec::new();
        for region in roots {
            if !seen.insert(region) || !self.tracked(svals, region) {
                continue;
            }
            match store.direct(region) {
                Some(SVal::Loc(Loc::Region(target))) => symbols.extend(regions.symbolic_base(*target)),
                Some(value) => symbols.extend(value.as_symbol()),
                None => {}
            }
            let (key, value) = conjure_contents(svals, region, request);
            result = result.insert(key, value);
            invalidated.push(region);
        }
        InvalidationResult {
            store: result,
            symbols,
            regions: invalidated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{build_program, ExprId, LocationContextManager, VarId};
    use crate::frontend::parse_source;
    use crate::memory::{MemRegionManager, RegionIndex};
    use crate::svals::SymbolManager;
    use test_log::test;

    #[test]
    fn test_only_variables_are_tracked() {
        let program = build_program(&parse_source("void f() { int x; int arr[2]; }").unwrap(), "test.c").unwrap();
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = FlatStoreManager::new();

        let x = regions.var_region(VarId(0), frame);
        let arr = regions.var_region(VarId(1), frame);
        let element = regions.element_region(Type::Int, RegionIndex::Concrete(0), arr);

        let store = manager.bind(&svals, &Store::new(), Loc::Region(x), SVal::int(4));
        let store = manager.bind(&svals, &store, Loc::Region(element), SVal::int(8));
        assert_eq!(store.len(), 1);
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(x), &Type::Int), SVal::int(4));
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(element), &Type::Int), SVal::Unknown);

        let result = manager.invalidate_regions(
            &svals,
            &store,
            &Invalidation {
                regions: vec![x],
                expr: ExprId(0),
                frame,
                count: 1,
                include_globals: false,
            },
        );
        assert!(manager
            .retrieve(&svals, &result.store, Loc::Region(x), &Type::Int)
            .as_symbol()
            .is_some());
    }
}
