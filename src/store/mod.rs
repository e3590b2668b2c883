//! Bindings from memory regions to values
//!
//! A [`Store`] is an immutable map from regions to [`SVal`]s. Updating a
//! store returns a new one that shares structure with the old, so keeping
//! a store alive is a cheap clone and old stores stay queryable.
//!
//! Two kinds of bindings exist per region:
//! - **direct**: the value stored at exactly this region
//! - **default**: the value of every part of the region that has no
//!   binding of its own (zero-initialized arrays, invalidated structs)
//!
//! The policy for reading, writing and invalidating memory lives behind
//! the [`StoreManager`] trait:
//! - [`RegionStoreManager`]: field and element sensitive
//! - [`FlatStoreManager`]: whole variables only

pub mod flat;
pub mod persistent;
pub mod region;

pub use flat::FlatStoreManager;
pub use persistent::PersistentMap;
pub use region::RegionStoreManager;

use crate::cfg::{ExprId, FrameId};
use crate::frontend::ast::Type;
use crate::memory::{MemRegion, RegionId, RegionIndex};
use crate::state::SymbolReaper;
use crate::svals::{Loc, SVal, SValBuilder, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKind {
    Direct,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub region: RegionId,
    pub kind: BindingKind,
}

impl BindingKey {
    pub fn direct(region: RegionId) -> Self {
        Self {
            region,
            kind: BindingKind::Direct,
        }
    }

    pub fn default(region: RegionId) -> Self {
        Self {
            region,
            kind: BindingKind::Default,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Store {
    bindings: PersistentMap<BindingKey, SVal>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direct(&self, region: RegionId) -> Option<&SVal> {
        self.bindings.get(&BindingKey::direct(region))
    }

    pub fn default_binding(&self, region: RegionId) -> Option<&SVal> {
        self.bindings.get(&BindingKey::default(region))
    }

    pub fn insert(&self, key: BindingKey, value: SVal) -> Store {
        Store {
            bindings: self.bindings.insert(key, value),
        }
    }

    pub fn remove(&self, key: BindingKey) -> Store {
        Store {
            bindings: self.bindings.remove(&key),
        }
    }

    pub fn retain(&self, keep: impl FnMut(&BindingKey, &SVal) -> bool) -> Store {
        Store {
            bindings: self.bindings.retain(keep),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BindingKey, &SVal)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// What an opaque operation may have written.
#[derive(Debug, Clone)]
pub struct Invalidation {
    pub regions: Vec<RegionId>,
    /// Expression responsible, used to conjure the fresh values
    pub expr: ExprId,
    pub frame: FrameId,
    pub count: u32,
    pub include_globals: bool,
}

#[derive(Debug, Clone)]
pub struct InvalidationResult {
    pub store: Store,
    /// Symbols that were bound in the invalidated memory
    pub symbols: Vec<SymbolId>,
    /// Base regions that received fresh contents
    pub regions: Vec<RegionId>,
}

/// Read, write and invalidation policy over [`Store`]s.
///
/// Every operation is a pure function from stores to stores; precision
/// loss shows up as `Unknown` results, never as an error.
pub trait StoreManager {
    fn name(&self) -> &'static str;

    /// Value at `loc` read as `ty`.
    fn retrieve(&self, svals: &SValBuilder<'_, '_>, store: &Store, loc: Loc, ty: &Type) -> SVal;

    fn bind(&self, svals: &SValBuilder<'_, '_>, store: &Store, loc: Loc, value: SVal) -> Store;

    /// Give every part of `region` without its own binding the value `value`.
    fn bind_default(&self, svals: &SValBuilder<'_, '_>, store: &Store, region: RegionId, value: SVal) -> Store;

    /// Drop every binding at or inside `region`.
    fn kill_binding(&self, svals: &SValBuilder<'_, '_>, store: &Store, region: RegionId) -> Store {
        let regions = svals.regions();
        store.retain(|key, _| key.region != region && !regions.is_sub_region_of(key.region, region))
    }

    fn invalidate_regions(
        &self,
        svals: &SValBuilder<'_, '_>,
        store: &Store,
        request: &Invalidation,
    ) -> InvalidationResult;

    /// Drop the bindings of regions the reaper found dead.
    fn remove_dead_bindings(&self, store: &Store, reaper: &SymbolReaper<'_, '_>) -> Store {
        store.retain(|key, _| reaper.is_live_region(key.region))
    }

    /// The region a pointer to `region` reads as `ty` through.
    fn cast_region(&self, svals: &SValBuilder<'_, '_>, region: RegionId, ty: &Type) -> RegionId {
        let regions = svals.regions();
        if ty.is_void() || matches!(regions.get(region), MemRegion::Code { .. }) {
            return region;
        }
        match regions.value_type(region) {
            Some(current) if current == *ty => region,
            _ => regions.element_region(ty.clone(), RegionIndex::Concrete(0), region),
        }
    }
}

/// Store manager for the configured store kind.
pub fn store_manager(kind: crate::config::StoreKind) -> Box<dyn StoreManager> {
    match kind {
        crate::config::StoreKind::Region => Box::new(RegionStoreManager::new()),
        crate::config::StoreKind::Flat => Box::new(FlatStoreManager::new()),
    }
}

/// Fresh contents for `region` after an opaque write.
pub(crate) fn conjure_contents(svals: &SValBuilder<'_, '_>, region: RegionId, request: &Invalidation) -> (BindingKey, SVal) {
    let value_type = svals.regions().value_type(region);
    match value_type {
        Some(ty) if ty.is_scalar() => {
            let symbol = svals
                .symbols()
                .conjured(request.expr, request.frame, ty, request.count, Some(region));
            (BindingKey::direct(region), svals.symbol_value(symbol))
        }
        other => {
            let ty = other.unwrap_or(Type::Int);
            let symbol = svals
                .symbols()
                .conjured(request.expr, request.frame, ty, request.count, Some(region));
            (BindingKey::default(region), SVal::symbol(symbol))
        }
    }
}

/// Reinterpret a constant for the kind of value `ty` holds.
pub(crate) fn fit_to_type(value: SVal, ty: &Type) -> SVal {
    match value {
        SVal::NonLoc(crate::svals::NonLoc::ConcreteInt(n)) if ty.is_pointer() => SVal::Loc(Loc::ConcreteInt(n)),
        SVal::Loc(Loc::ConcreteInt(n)) if ty.is_integer() => SVal::int(n),
        other => other,
    }
}
