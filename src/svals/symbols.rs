//! Symbolic values
//!
//! A symbol stands for a value the analysis does not know. Symbols are
//! interned by [`SymbolManager`], so a symbol built twice from the same
//! ingredients is the same [`SymbolId`].
//!
//! - `RegionValue`: the initial contents of a region (a parameter, a global)
//! - `Conjured`: a value produced by an expression the engine cannot model,
//!   such as the result of an unknown call
//! - `Derived`: the contents of a sub-region of memory that was invalidated
//!   as a whole
//! - `SymInt`, `IntSym`, `SymSym`: arithmetic and comparisons over symbols

use crate::cfg::{ExprId, FrameId};
use crate::frontend::ast::{BinOp, Type};
use crate::memory::{MemRegionManager, RegionId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymExpr {
    RegionValue {
        region: RegionId,
        ty: Type,
    },
    Conjured {
        expr: ExprId,
        frame: FrameId,
        ty: Type,
        /// Block visit count, so each loop iteration gets a fresh symbol
        count: u32,
        /// Region being invalidated, when conjured for invalidation
        tag: Option<RegionId>,
    },
    Derived {
        parent: SymbolId,
        region: RegionId,
        ty: Type,
    },
    SymInt {
        lhs: SymbolId,
        op: BinOp,
        rhs: i64,
        ty: Type,
    },
    IntSym {
        lhs: i64,
        op: BinOp,
        rhs: SymbolId,
        ty: Type,
    },
    SymSym {
        lhs: SymbolId,
        op: BinOp,
        rhs: SymbolId,
        ty: Type,
    },
}

impl SymExpr {
    pub fn ty(&self) -> &Type {
        match self {
            SymExpr::RegionValue { ty, .. }
            | SymExpr::Conjured { ty, .. }
            | SymExpr::Derived { ty, .. }
            | SymExpr::SymInt { ty, .. }
            | SymExpr::IntSym { ty, .. }
            | SymExpr::SymSym { ty, .. } => ty,
        }
    }

    /// Atomic symbols are not built from other symbols.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            SymExpr::RegionValue { .. } | SymExpr::Conjured { .. } | SymExpr::Derived { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct SymbolManager {
    symbols: RefCell<Vec<SymExpr>>,
    index: RefCell<FxHashMap<SymExpr, SymbolId>>,
}

impl SymbolManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, expr: SymExpr) -> SymbolId {
        if let Some(id) = self.index.borrow().get(&expr) {
            return *id;
        }
        let mut symbols = self.symbols.borrow_mut();
        let id = SymbolId(symbols.len() as u32);
        symbols.push(expr.clone());
        self.index.borrow_mut().insert(expr, id);
        id
    }

    pub fn get(&self, id: SymbolId) -> SymExpr {
        self.symbols.borrow()[id.0 as usize].clone()
    }

    pub fn len(&self) -> usize {
        self.symbols.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn region_value(&self, region: RegionId, ty: Type) -> SymbolId {
        self.intern(SymExpr::RegionValue { region, ty })
    }

    pub fn conjured(&self, expr: ExprId, frame: FrameId, ty: Type, count: u32, tag: Option<RegionId>) -> SymbolId {
        self.intern(SymExpr::Conjured {
            expr,
            frame,
            ty,
            count,
            tag,
        })
    }

    pub fn derived(&self, parent: SymbolId, region: RegionId, ty: Type) -> SymbolId {
        self.intern(SymExpr::Derived { parent, region, ty })
    }

    pub fn sym_int(&self, lhs: SymbolId, op: BinOp, rhs: i64, ty: Type) -> SymbolId {
        self.intern(SymExpr::SymInt { lhs, op, rhs, ty })
    }

    pub fn int_sym(&self, lhs: i64, op: BinOp, rhs: SymbolId, ty: Type) -> SymbolId {
        self.intern(SymExpr::IntSym { lhs, op, rhs, ty })
    }

    pub fn sym_sym(&self, lhs: SymbolId, op: BinOp, rhs: SymbolId, ty: Type) -> SymbolId {
        self.intern(SymExpr::SymSym { lhs, op, rhs, ty })
    }

    pub fn symbol_type(&self, id: SymbolId) -> Type {
        self.symbols.borrow()[id.0 as usize].ty().clone()
    }

    /// Symbols `id` is built from.
    pub fn operands(&self, id: SymbolId) -> Vec<SymbolId> {
        match self.get(id) {
            SymExpr::RegionValue { .. } | SymExpr::Conjured { .. } => Vec::new(),
            SymExpr::Derived { parent, .. } => vec![parent],
            SymExpr::SymInt { lhs, .. } => vec![lhs],
            SymExpr::IntSym { rhs, .. } => vec![rhs],
            SymExpr::SymSym { lhs, rhs, .. } => vec![lhs, rhs],
        }
    }

    /// `id` and every symbol it transitively depends on.
    pub fn dependencies(&self, id: SymbolId) -> Vec<SymbolId> {
        let mut result = vec![id];
        let mut cursor = 0;
        while cursor < result.len() {
            for operand in self.operands(result[cursor]) {
                if !result.contains(&operand) {
                    result.push(operand);
                }
            }
            cursor += 1;
        }
        result
    }

    /// Debug spelling in the analyzer's usual notation (`reg_$0<x>`,
    /// `conj_$3{int}`, `($1) + 4`).
    pub fn dump(&self, id: SymbolId, regions: &MemRegionManager<'_>) -> String {
        match self.get(id) {
            SymExpr::RegionValue { region, .. } => format!("reg_{}<{}>", id, regions.dump(region)),
            SymExpr::Conjured { ty, .. } => format!("conj_{}{{{}}}", id, ty),
            SymExpr::Derived { parent, region, .. } => {
                format!("derived_{}{{{},{}}}", id, self.dump(parent, regions), regions.dump(region))
            }
            SymExpr::SymInt { lhs, op, rhs, .. } => format!("({}) {} {}", self.dump(lhs, regions), op, rhs),
            SymExpr::IntSym { lhs, op, rhs, .. } => format!("{} {} ({})", lhs, op, self.dump(rhs, regions)),
            SymExpr::SymSym { lhs, op, rhs, .. } => {
                format!("({}) {} ({})", self.dump(lhs, regions), op, self.dump(rhs, regions))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_interned() {
        let symbols = SymbolManager::new();
        let a = symbols.conjured(ExprId(1), FrameId(0), Type::Int, 1, None);
        let b = symbols.conjured(ExprId(1), FrameId(0), Type::Int, 1, None);
        let c = symbols.conjured(ExprId(1), FrameId(0), Type::Int, 2, None);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let sum = symbols.sym_int(a, BinOp::Add, 3, Type::Int);
        let cmp = symbols.sym_sym(sum, BinOp::Lt, c, Type::Int);
        assert_eq!(symbols.dependencies(cmp), vec![cmp, sum, c, a]);
        assert!(!symbols.get(cmp).is_atomic());
        assert_eq!(symbols.symbol_type(cmp), Type::Int);
    }
}
