//! Arithmetic over symbolic values
//!
//! [`SValBuilder`] evaluates C operators on [`SVal`]s:
//!
//! - concrete operands fold, wrapping to the width of the result type
//! - a symbol combined with a constant becomes a `SymInt` (or `IntSym`)
//! - pointer arithmetic moves between element regions
//! - pointer comparisons are decided by region identity where possible;
//!   a symbolic pointer compared with null becomes a symbolic comparison
//! - undefined operands make the result undefined; anything else the
//!   builder cannot express becomes `Unknown`

use super::symbols::{SymExpr, SymbolManager};
use super::sval::{Loc, NonLoc, SVal};
use crate::cfg::{ExprId, FrameId, UnaryOp};
use crate::frontend::ast::{BinOp, Type};
use crate::memory::{MemRegion, MemRegionManager, RegionId, RegionIndex};

/// Truncate `value` to the width of `ty`, sign-extending the result.
pub fn wrap_int(value: i64, ty: &Type) -> i64 {
    match ty.bit_width() {
        Some(8) => value as i8 as i64,
        Some(32) => value as i32 as i64,
        _ => value,
    }
}

fn fold_concrete(op: BinOp, lhs: i64, rhs: i64, ty: &Type) -> SVal {
    let width = ty.bit_width().unwrap_or(64);
    let value = match op {
        BinOp::Add => lhs.wrapping_add(rhs),
        BinOp::Sub => lhs.wrapping_sub(rhs),
        BinOp::Mul => lhs.wrapping_mul(rhs),
        BinOp::Div | BinOp::Rem if rhs == 0 => return SVal::Undefined,
        BinOp::Div => lhs.wrapping_div(rhs),
        BinOp::Rem => lhs.wrapping_rem(rhs),
        BinOp::Shl | BinOp::Shr if rhs < 0 || rhs >= width as i64 => return SVal::Undefined,
        BinOp::Shl => lhs.wrapping_shl(rhs as u32),
        BinOp::Shr => lhs.wrapping_shr(rhs as u32),
        BinOp::BitAnd => lhs & rhs,
        BinOp::BitOr => lhs | rhs,
        BinOp::BitXor => lhs ^ rhs,
        BinOp::Eq => (lhs == rhs) as i64,
        BinOp::Ne => (lhs != rhs) as i64,
        BinOp::Lt => (lhs < rhs) as i64,
        BinOp::Le => (lhs <= rhs) as i64,
        BinOp::Gt => (lhs > rhs) as i64,
        BinOp::Ge => (lhs >= rhs) as i64,
    };
    SVal::int(wrap_int(value, ty))
}

pub struct SValBuilder<'a, 'p> {
    regions: &'a MemRegionManager<'p>,
    symbols: &'a SymbolManager,
}

impl<'a, 'p> SValBuilder<'a, 'p> {
    pub fn new(regions: &'a MemRegionManager<'p>, symbols: &'a SymbolManager) -> Self {
        Self { regions, symbols }
    }

    pub fn regions(&self) -> &'a MemRegionManager<'p> {
        self.regions
    }

    pub fn symbols(&self) -> &'a SymbolManager {
        self.symbols
    }

    pub fn make_int(&self, value: i64, ty: &Type) -> SVal {
        if ty.is_pointer() {
            SVal::Loc(Loc::ConcreteInt(value))
        } else {
            SVal::int(wrap_int(value, ty))
        }
    }

    /// Zero of the kind of `value` (null for locations).
    pub fn make_zero_like(&self, value: &SVal) -> SVal {
        match value {
            SVal::Loc(_) => SVal::null(),
            _ => SVal::int(0),
        }
    }

    /// Wrap a symbol as a value: pointer symbols point to a symbolic region.
    pub fn symbol_value(&self, symbol: super::SymbolId) -> SVal {
        if self.symbols.symbol_type(symbol).is_pointer() {
            SVal::region(self.regions.symbolic_region(symbol))
        } else {
            SVal::symbol(symbol)
        }
    }

    /// Fresh value for an expression the engine does not model.
    pub fn conjure(&self, expr: ExprId, frame: FrameId, ty: &Type, count: u32) -> SVal {
        if !ty.is_scalar() {
            return SVal::Unknown;
        }
        let symbol = self.symbols.conjured(expr, frame, ty.clone(), count, None);
        self.symbol_value(symbol)
    }

    /// Initial contents of a region with no binding.
    pub fn region_value(&self, region: RegionId, ty: &Type) -> SVal {
        if !ty.is_scalar() {
            return SVal::Unknown;
        }
        let symbol = self.symbols.region_value(region, ty.clone());
        self.symbol_value(symbol)
    }

    /// Contents of `region` inside memory that was bound to `parent` as a
    /// whole.
    pub fn derived_value(&self, parent: super::SymbolId, region: RegionId, ty: &Type) -> SVal {
        if !ty.is_scalar() {
            return SVal::Unknown;
        }
        let symbol = self.symbols.derived(parent, region, ty.clone());
        self.symbol_value(symbol)
    }

    pub fn eval_unary(&self, op: UnaryOp, value: SVal, ty: &Type) -> SVal {
        match op {
            UnaryOp::Not => {
                let zero = self.make_zero_like(&value);
                self.eval_binop(BinOp::Eq, value, zero, &Type::Int)
            }
            UnaryOp::Neg => self.eval_binop(BinOp::Sub, SVal::int(0), value, ty),
            UnaryOp::BitNot => self.eval_binop(BinOp::BitXor, value, SVal::int(-1), ty),
        }
    }

    pub fn eval_binop(&self, op: BinOp, lhs: SVal, rhs: SVal, ty: &Type) -> SVal {
        if lhs.is_undef() || rhs.is_undef() {
            return SVal::Undefined;
        }
        if lhs.is_unknown() || rhs.is_unknown() {
            return SVal::Unknown;
        }
        match (lhs, rhs) {
            (SVal::NonLoc(l), SVal::NonLoc(r)) => self.eval_nonloc(op, l, r, ty),
            (SVal::Loc(l), SVal::Loc(r)) => self.eval_loc_loc(op, l, r),
            (SVal::Loc(l), SVal::NonLoc(r)) => self.eval_pointer_arith(op, l, r, ty),
            (SVal::NonLoc(l), SVal::Loc(r)) if op == BinOp::Add => self.eval_pointer_arith(op, r, l, ty),
            _ => SVal::Unknown,
        }
    }

    fn eval_nonloc(&self, op: BinOp, lhs: NonLoc, rhs: NonLoc, ty: &Type) -> SVal {
        match (lhs, rhs) {
            (NonLoc::ConcreteInt(a), NonLoc::ConcreteInt(b)) => fold_concrete(op, a, b, ty),
            (NonLoc::Symbol(s), NonLoc::ConcreteInt(c)) => self.sym_op_int(s, op, c, ty),
            (NonLoc::ConcreteInt(c), NonLoc::Symbol(s)) => {
                if let Some(reversed) = op.reversed() {
                    self.sym_op_int(s, reversed, c, ty)
                } else if op.is_commutative() {
                    self.sym_op_int(s, op, c, ty)
                } else {
                    SVal::symbol(self.symbols.int_sym(c, op, s, ty.clone()))
                }
            }
            (NonLoc::Symbol(a), NonLoc::Symbol(b)) => {
                if a == b {
                    match op {
                        BinOp::Sub | BinOp::BitXor => return SVal::int(0),
                        BinOp::Eq | BinOp::Le | BinOp::Ge => return SVal::int(1),
                        BinOp::Ne | BinOp::Lt | BinOp::Gt => return SVal::int(0),
                        _ => {}
                    }
                }
                SVal::symbol(self.symbols.sym_sym(a, op, b, ty.clone()))
            }
            (NonLoc::LocAsInteger(loc), NonLoc::ConcreteInt(c)) if op.is_comparison() => {
                self.eval_loc_loc(op, loc, Loc::ConcreteInt(c))
            }
            _ => {
                log::trace!("no arithmetic for {:?} operands; result is unknown", op);
                SVal::Unknown
            }
        }
    }

    fn sym_op_int(&self, sym: super::SymbolId, op: BinOp, value: i64, ty: &Type) -> SVal {
        match (op, value) {
            (BinOp::Add | BinOp::Sub | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr, 0)
            | (BinOp::Mul | BinOp::Div, 1) => return SVal::symbol(sym),
            (BinOp::Mul | BinOp::BitAnd, 0) => return SVal::int(0),
            _ => {}
        }
        // (s + a) + b  =>  s + (a + b)
        if matches!(op, BinOp::Add | BinOp::Sub) {
            if let SymExpr::SymInt {
                lhs: base,
                op: inner @ (BinOp::Add | BinOp::Sub),
                rhs: inner_value,
                ..
            } = self.symbols.get(sym)
            {
                let first = if inner == BinOp::Add { inner_value } else { -inner_value };
                let second = if op == BinOp::Add { value } else { -value };
                let total = wrap_int(first.wrapping_add(second), ty);
                return self.sym_op_int(base, BinOp::Add, total, ty);
            }
        }
        SVal::symbol(self.symbols.sym_int(sym, op, value, ty.clone()))
    }

    fn eval_loc_loc(&self, op: BinOp, lhs: Loc, rhs: Loc) -> SVal {
        match (lhs, rhs) {
            (Loc::ConcreteInt(a), Loc::ConcreteInt(b)) => fold_concrete(op, a, b, &Type::Void.pointer_to()),
            (Loc::Region(region), Loc::ConcreteInt(value)) => self.compare_region_with_int(op, region, value),
            (Loc::ConcreteInt(value), Loc::Region(region)) => match op.reversed() {
                Some(reversed) => self.compare_region_with_int(reversed, region, value),
                None => SVal::Unknown,
            },
            (Loc::Region(a), Loc::Region(b)) => self.compare_regions(op, a, b),
        }
    }

    fn compare_region_with_int(&self, op: BinOp, region: RegionId, value: i64) -> SVal {
        if value != 0 || !matches!(op, BinOp::Eq | BinOp::Ne) {
            return SVal::Unknown;
        }
        match self.regions.symbolic_base(region) {
            // memory behind a symbolic pointer is null exactly when the pointer is
            Some(symbol) => SVal::symbol(self.symbols.sym_int(symbol, op, 0, Type::Int)),
            None => SVal::int((op == BinOp::Ne) as i64),
        }
    }

    fn compare_regions(&self, op: BinOp, a: RegionId, b: RegionId) -> SVal {
        if a == b {
            return fold_concrete(op, 0, 0, &Type::Int);
        }
        let (base_a, base_b) = (self.regions.base_region(a), self.regions.base_region(b));
        if base_a != base_b {
            let symbolic = matches!(self.regions.get(base_a), MemRegion::Symbolic { .. })
                || matches!(self.regions.get(base_b), MemRegion::Symbolic { .. });
            return match (op, symbolic) {
                // distinct objects never share an address
                (BinOp::Eq, false) => SVal::int(0),
                (BinOp::Ne, false) => SVal::int(1),
                _ => SVal::Unknown,
            };
        }
        match (self.regions.as_offset(a), self.regions.as_offset(b)) {
            (Some(x), Some(y)) => fold_concrete(op, x.offset, y.offset, &Type::Int),
            _ => SVal::Unknown,
        }
    }

    /// `loc op offset` for `+`, `-` and pointer-pointer subtraction
    fn eval_pointer_arith(&self, op: BinOp, loc: Loc, offset: NonLoc, ty: &Type) -> SVal {
        if !matches!(op, BinOp::Add | BinOp::Sub) {
            return match offset {
                NonLoc::ConcreteInt(c) if op.is_comparison() => self.eval_loc_loc(op, loc, Loc::ConcreteInt(c)),
                _ => SVal::Unknown,
            };
        }
        let element_type = match ty.pointee() {
            Some(t) if !t.is_void() => t.clone(),
            _ => Type::Char,
        };
        let element_size = self.regions.program().size_of(&element_type) as i64;

        match (loc, offset) {
            (Loc::ConcreteInt(base), NonLoc::ConcreteInt(n)) => {
                let delta = n.wrapping_mul(element_size);
                let value = if op == BinOp::Add {
                    base.wrapping_add(delta)
                } else {
                    base.wrapping_sub(delta)
                };
                SVal::Loc(Loc::ConcreteInt(value))
            }
            (Loc::Region(region), NonLoc::ConcreteInt(0)) => SVal::region(region),
            (Loc::Region(region), NonLoc::ConcreteInt(n)) => {
                let n = if op == BinOp::Add { n } else { -n };
                match self.regions.get(region) {
                    MemRegion::Element {
                        element_type: current,
                        index: RegionIndex::Concrete(i),
                        super_region,
                    } if current == element_type => SVal::region(self.regions.element_region(
                        element_type,
                        RegionIndex::Concrete(i.wrapping_add(n)),
                        super_region,
                    )),
                    _ => SVal::region(self.regions.element_region(element_type, RegionIndex::Concrete(n), region)),
                }
            }
            (Loc::Region(region), NonLoc::Symbol(sym)) if op == BinOp::Add => match self.regions.get(region) {
                MemRegion::Element {
                    element_type: current,
                    index: RegionIndex::Concrete(0),
                    super_region,
                } if current == element_type => SVal::region(self.regions.element_region(
                    element_type,
                    RegionIndex::Symbolic(sym),
                    super_region,
                )),
                MemRegion::Element { .. } => SVal::Unknown,
                _ => SVal::region(self.regions.element_region(element_type, RegionIndex::Symbolic(sym), region)),
            },
            _ => SVal::Unknown,
        }
    }

    /// `a - b` for two pointers into the same array
    pub fn eval_pointer_diff(&self, lhs: &SVal, rhs: &SVal) -> SVal {
        let (Some(a), Some(b)) = (lhs.as_region(), rhs.as_region()) else {
            return match (lhs.as_loc(), rhs.as_loc()) {
                (Some(Loc::ConcreteInt(a)), Some(Loc::ConcreteInt(b))) => SVal::int(a.wrapping_sub(b)),
                _ if lhs.is_undef() || rhs.is_undef() => SVal::Undefined,
                _ => SVal::Unknown,
            };
        };
        if a == b {
            return SVal::int(0);
        }
        match (self.regions.get(a), self.regions.get(b)) {
            (
                MemRegion::Element {
                    element_type: ta,
                    index: RegionIndex::Concrete(i),
                    super_region: sa,
                },
                MemRegion::Element {
                    element_type: tb,
                    index: RegionIndex::Concrete(j),
                    super_region: sb,
                },
            ) if sa == sb && ta == tb => SVal::int(i - j),
            _ => SVal::Unknown,
        }
    }

    /// Convert `value` from `from` to `to`.
    pub fn eval_cast(&self, value: SVal, from: &Type, to: &Type) -> SVal {
        if to.is_void() {
            return SVal::Unknown;
        }
        if value.is_unknown_or_undef() || from == to {
            return value;
        }
        match value {
            SVal::NonLoc(NonLoc::ConcreteInt(n)) if to.is_pointer() => SVal::Loc(Loc::ConcreteInt(n)),
            SVal::NonLoc(NonLoc::ConcreteInt(n)) => SVal::int(wrap_int(n, to)),
            SVal::NonLoc(NonLoc::LocAsInteger(loc)) if to.is_pointer() => SVal::Loc(loc),
            SVal::NonLoc(NonLoc::Symbol(_)) if to.is_pointer() => {
                log::trace!("integer symbol cast to '{}' becomes unknown", to);
                SVal::Unknown
            }
            SVal::Loc(Loc::ConcreteInt(n)) if to.is_integer() => SVal::int(wrap_int(n, to)),
            SVal::Loc(loc) if to.is_integer() => SVal::NonLoc(NonLoc::LocAsInteger(loc)),
            other => other,
        }
    }
}
