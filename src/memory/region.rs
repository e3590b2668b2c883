// Region kinds

use crate::cfg::{ExprId, FieldId, FrameId, FunctionId, VarId};
use crate::frontend::ast::Type;
use crate::svals::SymbolId;
use std::fmt;

/// Handle to an interned region; equal handles mean equal regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalsKind {
    /// `static` globals and static locals
    StaticGlobals,
    NonStaticGlobals,
    /// String literals and other read-only data
    Immutable,
}

/// Index of an element region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionIndex {
    Concrete(i64),
    Symbolic(SymbolId),
}

impl RegionIndex {
    pub fn as_concrete(self) -> Option<i64> {
        match self {
            RegionIndex::Concrete(n) => Some(n),
            RegionIndex::Symbolic(_) => None,
        }
    }
}

impl fmt::Display for RegionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionIndex::Concrete(n) => write!(f, "{}", n),
            RegionIndex::Symbolic(sym) => write!(f, "{}", sym),
        }
    }
}

/// An abstract memory location
///
/// Memory spaces have no super-region; every other region names the region
/// it is part of. Chains always end at a memory space because regions are
/// only built bottom-up through the manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemRegion {
    // ===== Memory spaces =====
    StackLocals { frame: FrameId },
    StackArguments { frame: FrameId },
    Heap,
    Unknown,
    Globals(GlobalsKind),
    CodeSpace,

    // ===== Subregions =====
    /// Memory pointed to by a symbolic pointer
    Symbolic { symbol: SymbolId, super_region: RegionId },
    /// Result of `alloca`, identified by call expression and visit count
    Alloca {
        expr: ExprId,
        count: u32,
        super_region: RegionId,
    },
    /// Code of a function
    Code { function: FunctionId, super_region: RegionId },
    String { expr: ExprId, super_region: RegionId },
    /// Unnamed object holding an aggregate produced by an expression
    Temporary { expr: ExprId, super_region: RegionId },
    Var { var: VarId, super_region: RegionId },
    Field { field: FieldId, super_region: RegionId },
    Element {
        element_type: Type,
        index: RegionIndex,
        super_region: RegionId,
    },
}

impl MemRegion {
    pub fn is_memory_space(&self) -> bool {
        self.super_region().is_none()
    }

    pub fn super_region(&self) -> Option<RegionId> {
        match self {
            MemRegion::StackLocals { .. }
            | MemRegion::StackArguments { .. }
            | MemRegion::Heap
            | MemRegion::Unknown
            | MemRegion::Globals(_)
            | MemRegion::CodeSpace => None,
            MemRegion::Symbolic { super_region, .. }
            | MemRegion::Alloca { super_region, .. }
            | MemRegion::Code { super_region, .. }
            | MemRegion::String { super_region, .. }
            | MemRegion::Temporary { super_region, .. }
            | MemRegion::Var { super_region, .. }
            | MemRegion::Field { super_region, .. }
            | MemRegion::Element { super_region, .. } => Some(*super_region),
        }
    }

    /// Fields and elements are parts of a larger object.
    pub fn is_sub_object(&self) -> bool {
        matches!(self, MemRegion::Field { .. } | MemRegion::Element { .. })
    }

    pub fn is_stack_space(&self) -> bool {
        matches!(self, MemRegion::StackLocals { .. } | MemRegion::StackArguments { .. })
    }
}

/// Byte offset of a region inside its base region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionOffset {
    pub base: RegionId,
    pub offset: i64,
}
