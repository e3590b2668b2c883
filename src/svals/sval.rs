// Values computed by the engine

use super::symbols::SymbolId;
use crate::memory::RegionId;
use crate::store::Store;

/// A location value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Loc {
    Region(RegionId),
    /// A pointer with a known numeric value; `0` is the null pointer
    ConcreteInt(i64),
}

impl Loc {
    pub fn is_null(&self) -> bool {
        matches!(self, Loc::ConcreteInt(0))
    }

    pub fn as_region(&self) -> Option<RegionId> {
        match self {
            Loc::Region(region) => Some(*region),
            Loc::ConcreteInt(_) => None,
        }
    }
}

/// A non-location value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NonLoc {
    ConcreteInt(i64),
    Symbol(SymbolId),
    /// A pointer converted to an integer
    LocAsInteger(Loc),
    /// The contents of an aggregate region as of a given store
    LazyCompound { store: Store, region: RegionId },
}

/// Symbolic value of an expression or a memory location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SVal {
    /// Garbage: an uninitialized read or an undefined operation
    Undefined,
    /// Any value; the engine gave up tracking it
    Unknown,
    Loc(Loc),
    NonLoc(NonLoc),
}

impl SVal {
    pub fn int(value: i64) -> SVal {
        SVal::NonLoc(NonLoc::ConcreteInt(value))
    }

    pub fn null() -> SVal {
        SVal::Loc(Loc::ConcreteInt(0))
    }

    pub fn region(region: RegionId) -> SVal {
        SVal::Loc(Loc::Region(region))
    }

    pub fn symbol(symbol: SymbolId) -> SVal {
        SVal::NonLoc(NonLoc::Symbol(symbol))
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, SVal::Undefined)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SVal::Unknown)
    }

    pub fn is_unknown_or_undef(&self) -> bool {
        self.is_unknown() || self.is_undef()
    }

    pub fn as_loc(&self) -> Option<Loc> {
        match self {
            SVal::Loc(loc) => Some(*loc),
            _ => None,
        }
    }

    pub fn as_region(&self) -> Option<RegionId> {
        self.as_loc().and_then(|loc| loc.as_region())
    }

    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            SVal::NonLoc(NonLoc::Symbol(sym)) => Some(*sym),
            _ => None,
        }
    }

    /// The numeric value of integer and pointer constants.
    pub fn as_concrete_int(&self) -> Option<i64> {
        match self {
            SVal::NonLoc(NonLoc::ConcreteInt(n)) | SVal::Loc(Loc::ConcreteInt(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_concrete_int().is_some()
    }

    pub fn is_zero_constant(&self) -> bool {
        self.as_concrete_int() == Some(0)
    }
}
