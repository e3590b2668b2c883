//! Field and element sensitive store
//!
//! # Reading memory
//!
//! [`RegionStoreManager::retrieve`] answers with the most specific binding
//! it can find:
//!
//! 1. a direct binding of the region itself
//! 2. the default binding of the region or the nearest enclosing object:
//!    - a symbol yields a `Derived` symbol for the part being read
//!    - a lazy compound value reads the same path in the captured store
//!    - anything else (zero, undefined) is the value itself
//! 3. otherwise the memory space decides:
//!    - locals and allocas are uninitialized, so the value is `Undefined`
//!    - parameters, globals, heap and unknown memory get a `RegionValue`
//!      symbol standing for their initial contents
//!
//! Struct-typed reads return a lazy compound value instead of copying
//! fields, so `s2 = s1` costs one binding.

use super::{conjure_contents, fit_to_type, BindingKey, Invalidation, InvalidationResult, Store, StoreManager};
use crate::cfg::ExprKind;
use crate::frontend::ast::Type;
use crate::memory::{GlobalsKind, MemRegion, MemRegionManager, RegionId, RegionIndex};
use crate::svals::{Loc, NonLoc, SVal, SValBuilder};
use rustc_hash::FxHashSet;

#[derive(Debug, Default)]
pub struct RegionStoreManager;

impl RegionStoreManager {
    pub fn new() -> Self {
        Self
    }

    fn retrieve_region(&self, svals: &SValBuilder<'_, '_>, store: &Store, region: RegionId, ty: &Type) -> SVal {
        let regions = svals.regions();
        if ty.is_struct() {
            if let Some(value) = store.direct(region) {
                return value.clone();
            }
            if let Some(value @ SVal::NonLoc(NonLoc::LazyCompound { .. })) = store.default_binding(region) {
                return value.clone();
            }
            return SVal::NonLoc(NonLoc::LazyCompound {
                store: store.clone(),
                region,
            });
        }
        if ty.is_array() {
            return SVal::region(region);
        }

        if let Some(value) = store.direct(region) {
            return fit_to_type(value.clone(), ty);
        }

        let mut current = region;
        loop {
            if let Some(value) = store.default_binding(current) {
                return self.value_from_default(svals, value.clone(), current, region, ty);
            }
            let layer = regions.get(current);
            match (layer.is_sub_object(), layer.super_region()) {
                (true, Some(parent)) => current = parent,
                _ => break,
            }
        }

        if let Some(value) = string_literal_byte(regions, region) {
            return value;
        }

        match regions.get(regions.memory_space(region)) {
            MemRegion::StackLocals { .. } => SVal::Undefined,
            MemRegion::CodeSpace => SVal::Unknown,
            _ => svals.region_value(region, ty),
        }
    }

    fn value_from_default(
        &self,
        svals: &SValBuilder<'_, '_>,
        value: SVal,
        bound_at: RegionId,
        region: RegionId,
        ty: &Type,
    ) -> SVal {
        match value {
            SVal::NonLoc(NonLoc::Symbol(parent)) => {
                if bound_at == region && svals.symbols().symbol_type(parent) == *ty {
                    svals.symbol_value(parent)
                } else {
                    svals.derived_value(parent, region, ty)
                }
            }
            SVal::NonLoc(NonLoc::LazyCompound { store, region: source }) => {
                match rebase(svals.regions(), region, bound_at, source) {
                    Some(path) => self.retrieve_region(svals, &store, path, ty),
                    None => {
                        log::trace!("lazy compound read through a foreign path; result is unknown");
                        SVal::Unknown
                    }
                }
            }
            other => fit_to_type(other, ty),
        }
    }
}

/// `region` with its prefix `from` replaced by `onto`.
fn rebase(regions: &MemRegionManager<'_>, region: RegionId, from: RegionId, onto: RegionId) -> Option<RegionId> {
    if region == from {
        return Some(onto);
    }
    match regions.get(region) {
        MemRegion::Field { field, super_region } => {
            Some(regions.field_region(field, rebase(regions, super_region, from, onto)?))
        }
        MemRegion::Element {
            element_type,
            index,
            super_region,
        } => Some(regions.element_region(element_type, index, rebase(regions, super_region, from, onto)?)),
        _ => None,
    }
}

/// Characters of string literals are known.
fn string_literal_byte(regions: &MemRegionManager<'_>, region: RegionId) -> Option<SVal> {
    let MemRegion::Element {
        element_type: Type::Char,
        index: RegionIndex::Concrete(index),
        super_region,
    } = regions.get(region)
    else {
        return None;
    };
    let MemRegion::String { expr, .. } = regions.get(super_region) else {
        return None;
    };
    let ExprKind::StringLiteral(text) = &regions.program().expr(expr).kind else {
        return None;
    };
    let bytes = text.as_bytes();
    match usize::try_from(index) {
        Ok(i) if i < bytes.len() => Some(SVal::int(bytes[i] as i8 as i64)),
        Ok(i) if i == bytes.len() => Some(SVal::int(0)),
        _ => Some(SVal::Undefined),
    }
}

fn is_immutable(regions: &MemRegionManager<'_>, region: RegionId) -> bool {
    matches!(
        regions.get(regions.memory_space(region)),
        MemRegion::Globals(GlobalsKind::Immutable) | MemRegion::CodeSpace
    )
}

impl StoreManager for RegionStoreManager {
    fn name(&self) -> &'static str {
        "region"
    }

    fn retrieve(&self, svals: &SValBuilder<'_, '_>, store: &Store, loc: Loc, ty: &Type) -> SVal {
        match loc {
            Loc::Region(region) => self.retrieve_region(svals, store, region, ty),
            Loc::ConcreteInt(_) => {
                log::trace!("read through a constant address; result is unknown");
                SVal::Unknown
            }
        }
    }

    fn bind(&self, svals: &SValBuilder<'_, '_>, store: &Store, loc: Loc, value: SVal) -> Store {
        let Loc::Region(region) = loc else {
            return store.clone();
        };
        let regions = svals.regions();
        let aggregate = regions.value_type(region).is_some_and(|ty| ty.is_aggregate());
        let whole_object = matches!(value, SVal::NonLoc(NonLoc::LazyCompound { .. }))
            || (aggregate && matches!(value, SVal::Unknown | SVal::Undefined | SVal::NonLoc(NonLoc::Symbol(_))));
        if whole_object {
            self.kill_binding(svals, store, region)
                .insert(BindingKey::default(region), value)
        } else {
            store.insert(BindingKey::direct(region), value)
        }
    }

    fn bind_default(&self, _svals: &SValBuilder<'_, '_>, store: &Store, region: RegionId, value: SVal) -> Store {
        store.insert(BindingKey::default(region), value)
    }

    fn invalidate_regions(
        &self,
        svals: &SValBuilder<'_, '_>,
        store: &Store,
        request: &Invalidation,
    ) -> InvalidationResult {
        let regions = svals.regions();
        let mut worklist: Vec<RegionId> = request.regions.iter().map(|r| regions.base_region(*r)).collect();
        if request.include_globals {
            let program = regions.program();
            worklist.extend(program.global_vars().map(|var| regions.var_region(var, request.frame)));
        }

        let mut seen = FxHashSet::default();
        let mut symbols = Vec::new();
        let mut invalidated = Vec::new();
        let mut result = store.clone();

        while let Some(base) = worklist.pop() {
            if !seen.insert(base) || is_immutable(regions, base) {
                continue;
            }
            // whatever the old contents pointed to is reachable as well
            for (key, value) in store.iter() {
                if regions.base_region(key.region) != base {
                    continue;
                }
                match value {
                    SVal::Loc(Loc::Region(target)) => {
                        symbols.extend(regions.symbolic_base(*target));
                        worklist.push(regions.base_region(*target));
                    }
                    SVal::NonLoc(NonLoc::Symbol(symbol)) => symbols.push(*symbol),
                    _ => {}
                }
            }
            result = self.kill_binding(svals, &result, base);
            let (key, value) = conjure_contents(svals, base, request);
            result = result.insert(key, value);
            invalidated.push(base);
        }

        log::trace!("invalidated {} regions", invalidated.len());
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
    use crate::cfg::{build_program, ExprId, FieldId, LocationContextManager, Program, VarId};
    use crate::frontend::parse_source;
    use crate::svals::SymbolManager;
    use test_log::test;

    fn program(source: &str) -> Program {
        build_program(&parse_source(source).unwrap(), "test.c").unwrap()
    }

    fn var(program: &Program, name: &str) -> VarId {
        VarId(program.vars.iter().position(|v| v.name == name).unwrap() as u32)
    }

    const SOURCE: &str = "struct P { int x; int *q; };\nint g;\n\
        int f(int a, struct P *pp) { int x; int y; struct P s; int arr[3]; return 0; }";

    #[test]
    fn test_bind_then_retrieve() {
        let program = program(SOURCE);
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RegionStoreManager::new();

        let x = Loc::Region(regions.var_region(var(&program, "x"), frame));
        let empty = Store::new();
        let bound = manager.bind(&svals, &empty, x, SVal::int(5));

        assert_eq!(manager.retrieve(&svals, &bound, x, &Type::Int), SVal::int(5));
        // the old store is untouched
        assert_eq!(manager.retrieve(&svals, &empty, x, &Type::Int), SVal::Undefined);

        let rebound = manager.bind(&svals, &bound, x, SVal::int(7));
        assert_eq!(manager.retrieve(&svals, &rebound, x, &Type::Int), SVal::int(7));
        assert_eq!(manager.retrieve(&svals, &bound, x, &Type::Int), SVal::int(5));
    }

    #[test]
    fn test_unbound_memory_by_space() {
        let program = program(SOURCE);
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RegionStoreManager::new();
        let store = Store::new();

        let a = regions.var_region(var(&program, "a"), frame);
        let g = regions.var_region(var(&program, "g"), frame);
        let y = regions.var_region(var(&program, "y"), frame);

        let a_value = manager.retrieve(&svals, &store, Loc::Region(a), &Type::Int);
        let symbol = a_value.as_symbol().unwrap();
        assert_eq!(symbols.get(symbol), crate::svals::SymExpr::RegionValue { region: a, ty: Type::Int });
        // the same symbol every time
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(a), &Type::Int), a_value);
        assert!(manager.retrieve(&svals, &store, Loc::Region(g), &Type::Int).as_symbol().is_some());
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(y), &Type::Int), SVal::Undefined);
    }

    #[test]
    fn test_default_bindings_and_direct_precedence() {
        let program = program(SOURCE);
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RegionStoreManager::new();

        let arr = regions.var_region(var(&program, "arr"), frame);
        let first = regions.element_region(Type::Int, RegionIndex::Concrete(0), arr);
        let second = regions.element_region(Type::Int, RegionIndex::Concrete(1), arr);

        let store = manager.bind_default(&svals, &Store::new(), arr, SVal::int(0));
        let store = manager.bind(&svals, &store, Loc::Region(second), SVal::int(9));
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(first), &Type::Int), SVal::int(0));
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(second), &Type::Int), SVal::int(9));

        // a zero default reads as null through a pointer-typed field
        let s = regions.var_region(var(&program, "s"), frame);
        let owner = program.struct_by_name("P").unwrap();
        let q = regions.field_region(FieldId { owner, index: 1 }, s);
        let store = manager.bind_default(&svals, &store, s, SVal::int(0));
        assert_eq!(
            manager.retrieve(&svals, &store, Loc::Region(q), &Type::Int.pointer_to()),
            SVal::null()
        );
    }

    #[test]
    fn test_lazy_compound_copies() {
        let program = program(SOURCE);
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RegionStoreManager::new();
        let owner = program.struct_by_name("P").unwrap();
        let struct_type = Type::Struct("P".to_string());

        let s = regions.var_region(var(&program, "s"), frame);
        let pp = regions.var_region(var(&program, "pp"), frame);
        let pointer = manager.retrieve(&svals, &Store::new(), Loc::Region(pp), &struct_type.clone().pointer_to());
        let pointee = pointer.as_region().unwrap();
        let pointee_x = regions.field_region(FieldId { owner, index: 0 }, pointee);

        let store = manager.bind(&svals, &Store::new(), Loc::Region(pointee_x), SVal::int(3));
        let copy = manager.retrieve(&svals, &store, Loc::Region(pointee), &struct_type);
        assert!(matches!(copy, SVal::NonLoc(NonLoc::LazyCompound { .. })));

        let store = manager.bind(&svals, &store, Loc::Region(s), copy.clone());
        let s_x = regions.field_region(FieldId { owner, index: 0 }, s);
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(s_x), &Type::Int), SVal::int(3));
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(s), &struct_type), copy);

        // later writes to the source do not show through the copy
        let store = manager.bind(&svals, &store, Loc::Region(pointee_x), SVal::int(4));
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(s_x), &Type::Int), SVal::int(3));
    }

    #[test]
    fn test_invalidation_replaces_contents() {
        let program = program(SOURCE);
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RegionStoreManager::new();
        let owner = program.struct_by_name("P").unwrap();

        let x = regions.var_region(var(&program, "x"), frame);
        let s = regions.var_region(var(&program, "s"), frame);
        let y = regions.var_region(var(&program, "y"), frame);
        let s_x = regions.field_region(FieldId { owner, index: 0 }, s);
        let s_q = regions.field_region(FieldId { owner, index: 1 }, s);

        let store = manager.bind(&svals, &Store::new(), Loc::Region(x), SVal::int(1));
        let store = manager.bind(&svals, &store, Loc::Region(s_x), SVal::int(2));
        // s.q points to y, so y is reachable from s
        let store = manager.bind(&svals, &store, Loc::Region(s_q), SVal::region(y));
        let store = manager.bind(&svals, &store, Loc::Region(y), SVal::int(3));

        let result = manager.invalidate_regions(
            &svals,
            &store,
            &Invalidation {
                regions: vec![x, s_x],
                expr: ExprId(0),
                frame,
                count: 1,
                include_globals: false,
            },
        );
        let after = result.store;
        let x_value = manager.retrieve(&svals, &after, Loc::Region(x), &Type::Int);
        assert!(x_value.as_symbol().is_some());
        assert!(manager.retrieve(&svals, &after, Loc::Region(s_x), &Type::Int).as_symbol().is_some());
        assert!(manager.retrieve(&svals, &after, Loc::Region(y), &Type::Int).as_symbol().is_some());
        assert_eq!(result.regions.len(), 3);
        // the input store still holds the old values
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(x), &Type::Int), SVal::int(1));
    }

    #[test]
    fn test_invalidation_reports_pointed_to_symbols() {
        let program = program(SOURCE);
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RegionStoreManager::new();

        let pp = regions.var_region(var(&program, "pp"), frame);
        let heap = symbols.conjured(ExprId(7), frame, Type::Struct("P".to_string()).pointer_to(), 0, None);
        let store = manager.bind(&svals, &Store::new(), Loc::Region(pp), SVal::region(regions.symbolic_heap_region(heap)));

        let result = manager.invalidate_regions(
            &svals,
            &store,
            &Invalidation {
                regions: vec![pp],
                expr: ExprId(0),
                frame,
                count: 1,
                include_globals: false,
            },
        );
        assert!(result.symbols.contains(&heap));
        assert!(result.regions.contains(&regions.symbolic_heap_region(heap)));
    }

    #[test]
    fn test_string_literal_contents() {
        let program = program("char f() { return \"hi\"[1]; }");
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RegionStoreManager::new();

        let literal = program
            .exprs
            .iter()
            .position(|e| matches!(e.kind, ExprKind::StringLiteral(_)))
            .unwrap();
        let string = regions.string_region(ExprId(literal as u32));
        let second = regions.element_region(Type::Char, RegionIndex::Concrete(1), string);
        let end = regions.element_region(Type::Char, RegionIndex::Concrete(2), string);
        let store = Store::new();
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(second), &Type::Char), SVal::int('i' as i64));
        assert_eq!(manager.retrieve(&svals, &store, Loc::Region(end), &Type::Char), SVal::int(0));
    }
}
