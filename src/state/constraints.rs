//! Range-based constraint tracking
//!
//! Every constrained symbol maps to the [`RangeSet`] of values it may still
//! take on the current path. The set starts as the whole domain of the
//! symbol's type:
//!
//! | Type      | Domain                   |
//! |-----------|--------------------------|
//! | `char`    | `[-128, 127]`            |
//! | `int`     | `[i32::MIN, i32::MAX]`   |
//! | `pointer` | `[0, i64::MAX]`          |
//!
//! Assumptions intersect the set with the values satisfying the condition.
//! An empty intersection means the path is infeasible.
//!
//! Conditions understood directly:
//! - `sym`, `!sym` (via `sym == 0`)
//! - `sym op k` and `k op sym` for comparisons
//! - `(sym + c) op k` and `(sym - c) op k`, wrapping at the width of the
//!   sum the same way concrete arithmetic does
//! - locations: memory behind a symbolic pointer is non-null exactly when
//!   the pointer is
//!
//! Any other symbolic condition is tracked as a whole: assuming it true
//! constrains that symbol to be non-zero.

use super::reaper::SymbolReaper;
use crate::frontend::ast::{BinOp, Type};
use crate::store::PersistentMap;
use crate::svals::{Loc, NonLoc, SVal, SValBuilder, SymExpr, SymbolId};
use std::fmt;

/// Inclusive interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Range {
    pub lo: i64,
    pub hi: i64,
}

/// Sorted, disjoint, non-adjacent intervals
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    pub fn empty() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn interval(lo: i64, hi: i64) -> Self {
        if lo > hi {
            Self::empty()
        } else {
            Self {
                ranges: vec![Range { lo, hi }],
            }
        }
    }

    pub fn point(value: i64) -> Self {
        Self::interval(value, value)
    }

    /// Every value of `ty`.
    pub fn domain(ty: &Type) -> Self {
        let (lo, hi) = domain_bounds(ty);
        Self::interval(lo, hi)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.ranges.iter().any(|r| r.lo <= value && value <= r.hi)
    }

    pub fn single_value(&self) -> Option<i64> {
        match self.ranges.as_slice() {
            [r] if r.lo == r.hi => Some(r.lo),
            _ => None,
        }
    }

    pub fn min(&self) -> Option<i64> {
        self.ranges.first().map(|r| r.lo)
    }

    pub fn max(&self) -> Option<i64> {
        self.ranges.last().map(|r| r.hi)
    }

    pub fn intersect(&self, other: &RangeSet) -> RangeSet {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let a = self.ranges[i];
            let b = other.ranges[j];
            let lo = a.lo.max(b.lo);
            let hi = a.hi.min(b.hi);
            if lo <= hi {
                result.push(Range { lo, hi });
            }
            if a.hi < b.hi {
                i += 1;
            } else {
                j += 1;
            }
        }
        RangeSet { ranges: result }
    }

    /// Values of `ty` outside this set.
    pub fn complement(&self, ty: &Type) -> RangeSet {
        let (lo, hi) = domain_bounds(ty);
        let mut result = Vec::new();
        let mut next = Some(lo);
        for range in &self.ranges {
            if let Some(start) = next {
                if range.lo > start {
                    result.push(Range {
                        lo: start,
                        hi: range.lo - 1,
                    });
                }
            }
            next = range.hi.checked_add(1);
        }
        if let Some(start) = next {
            if start <= hi {
                result.push(Range { lo: start, hi });
            }
        }
        RangeSet { ranges: result }.intersect(&RangeSet::interval(lo, hi))
    }

    /// `{ v + delta | v in self }`, wrapping to the width of `ty` the way
    /// concrete arithmetic does. A range that crosses the wrap point
    /// splits in two.
    pub fn shifted(&self, delta: i64, ty: &Type) -> RangeSet {
        let (lo, hi) = domain_bounds(ty);
        let width = ty.bit_width().unwrap_or(64);
        let modulus = 1i128 << width;
        let (type_min, type_max) = (-(modulus / 2), modulus / 2 - 1);

        let mut pieces = Vec::new();
        for range in &self.ranges {
            let span = range.hi as i128 - range.lo as i128;
            if span + 1 >= modulus {
                pieces.push((type_min, type_max));
                continue;
            }
            let start = (range.lo as i128 + delta as i128 - type_min).rem_euclid(modulus) + type_min;
            let end = start + span;
            if end > type_max {
                pieces.push((start, type_max));
                pieces.push((type_min, end - modulus));
            } else {
                pieces.push((start, end));
            }
        }
        pieces.sort_unstable();

        let mut ranges: Vec<Range> = Vec::new();
        for (start, end) in pieces {
            let (start, end) = (start.max(lo as i128) as i64, end.min(hi as i128) as i64);
            if start > end {
                continue;
            }
            match ranges.last_mut() {
                Some(last) if last.hi.checked_add(1).map_or(true, |next| next >= start) => {
                    last.hi = last.hi.max(end);
                }
                _ => ranges.push(Range { lo: start, hi: end }),
            }
        }
        RangeSet { ranges }
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}, {}]", range.lo, range.hi)?;
        }
        write!(f, " }}")
    }
}

fn domain_bounds(ty: &Type) -> (i64, i64) {
    match ty {
        Type::Char => (i8::MIN as i64, i8::MAX as i64),
        Type::Int => (i32::MIN as i64, i32::MAX as i64),
        Type::Pointer(_) => (0, i64::MAX),
        _ => (i64::MIN, i64::MAX),
    }
}

/// Values `v` of `ty` with `v op k`.
fn relation_set(op: BinOp, k: i64, ty: &Type) -> RangeSet {
    let (lo, hi) = domain_bounds(ty);
    let point = RangeSet::point(k).intersect(&RangeSet::interval(lo, hi));
    match op {
        BinOp::Eq => point,
        BinOp::Ne => point.complement(ty),
        BinOp::Lt => k.checked_sub(1).map_or(RangeSet::empty(), |k| RangeSet::interval(lo, k.min(hi))),
        BinOp::Le => RangeSet::interval(lo, k.min(hi)),
        BinOp::Gt => k.checked_add(1).map_or(RangeSet::empty(), |k| RangeSet::interval(k.max(lo), hi)),
        BinOp::Ge => RangeSet::interval(k.max(lo), hi),
        _ => RangeSet::interval(lo, hi),
    }
}

/// Ranges of every constrained symbol on one path
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConstraintSet {
    ranges: PersistentMap<SymbolId, RangeSet>,
}

impl ConstraintSet {
    pub fn get(&self, symbol: SymbolId) -> Option<&RangeSet> {
        self.ranges.get(&symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolId, &RangeSet)> {
        self.ranges.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RangeConstraintManager;

impl RangeConstraintManager {
    pub fn new() -> Self {
        Self
    }

    /// Constraints with `cond` assumed to be `assumption`, or `None` when
    /// that contradicts what is already known.
    pub fn assume(
        &self,
        svals: &SValBuilder<'_, '_>,
        constraints: &ConstraintSet,
        cond: &SVal,
        assumption: bool,
    ) -> Option<ConstraintSet> {
        match cond {
            SVal::Undefined | SVal::Unknown => Some(constraints.clone()),
            SVal::Loc(loc) => self.assume_loc(svals, constraints, *loc, assumption),
            SVal::NonLoc(NonLoc::ConcreteInt(n)) => ((*n != 0) == assumption).then(|| constraints.clone()),
            SVal::NonLoc(NonLoc::LocAsInteger(loc)) => self.assume_loc(svals, constraints, *loc, assumption),
            SVal::NonLoc(NonLoc::LazyCompound { .. }) => Some(constraints.clone()),
            SVal::NonLoc(NonLoc::Symbol(symbol)) => self.assume_symbol(svals, constraints, *symbol, assumption),
        }
    }

    /// Both outcomes of a branch on `cond`.
    pub fn assume_dual(
        &self,
        svals: &SValBuilder<'_, '_>,
        constraints: &ConstraintSet,
        cond: &SVal,
    ) -> (Option<ConstraintSet>, Option<ConstraintSet>) {
        (
            self.assume(svals, constraints, cond, true),
            self.assume(svals, constraints, cond, false),
        )
    }

    /// The only value `symbol` can have, if it is pinned down.
    pub fn get_sym_val(&self, svals: &SValBuilder<'_, '_>, constraints: &ConstraintSet, symbol: SymbolId) -> Option<i64> {
        if let Some(value) = constraints.get(symbol).and_then(RangeSet::single_value) {
            return Some(value);
        }
        match svals.symbols().get(symbol) {
            SymExpr::SymInt { lhs, op, rhs, ty } if matches!(op, BinOp::Add | BinOp::Sub) => {
                let base = self.get_sym_val(svals, constraints, lhs)?;
                svals.eval_binop(op, SVal::int(base), SVal::int(rhs), &ty).as_concrete_int()
            }
            _ => None,
        }
    }

    pub fn remove_dead(&self, constraints: &ConstraintSet, reaper: &SymbolReaper<'_, '_>) -> ConstraintSet {
        ConstraintSet {
            ranges: constraints.ranges.retain(|symbol, _| reaper.is_live_symbol(*symbol)),
        }
    }

    fn assume_loc(
        &self,
        svals: &SValBuilder<'_, '_>,
        constraints: &ConstraintSet,
        loc: Loc,
        assumption: bool,
    ) -> Option<ConstraintSet> {
        match loc {
            Loc::ConcreteInt(n) => ((n != 0) == assumption).then(|| constraints.clone()),
            Loc::Region(region) => match svals.regions().symbolic_base(region) {
                Some(symbol) => {
                    let op = if assumption { BinOp::Ne } else { BinOp::Eq };
                    self.assume_relation(svals, constraints, symbol, op, 0)
                }
                // the address of a known object is never null
                None => assumption.then(|| constraints.clone()),
            },
        }
    }

    fn assume_symbol(
        &self,
        svals: &SValBuilder<'_, '_>,
        constraints: &ConstraintSet,
        symbol: SymbolId,
        assumption: bool,
    ) -> Option<ConstraintSet> {
        let relation = match svals.symbols().get(symbol) {
            SymExpr::SymInt { lhs, op, rhs, .. } if op.is_comparison() => Some((lhs, op, rhs)),
            SymExpr::IntSym { lhs, op, rhs, .. } if op.is_comparison() => op.reversed().map(|op| (rhs, op, lhs)),
            _ => None,
        };
        match relation {
            Some((subject, op, k)) => {
                let op = if assumption { Some(op) } else { op.negated() };
                match op {
                    Some(op) => self.assume_relation(svals, constraints, subject, op, k),
                    None => Some(constraints.clone()),
                }
            }
            None => {
                let op = if assumption { BinOp::Ne } else { BinOp::Eq };
                self.assume_relation(svals, constraints, symbol, op, 0)
            }
        }
    }

    /// Constrain `symbol op k`.
    fn assume_relation(
        &self,
        svals: &SValBuilder<'_, '_>,
        constraints: &ConstraintSet,
        symbol: SymbolId,
        op: BinOp,
        k: i64,
    ) -> Option<ConstraintSet> {
        let expr = svals.symbols().get(symbol);
        // (a < b) == 0  =>  !(a < b)
        if let (SymExpr::SymInt { op: inner, .. } | SymExpr::IntSym { op: inner, .. }, BinOp::Eq | BinOp::Ne, 0) =
            (&expr, op, k)
        {
            if inner.is_comparison() {
                return self.assume_symbol(svals, constraints, symbol, op == BinOp::Ne);
            }
        }
        let ty = svals.symbols().symbol_type(symbol);
        let allowed = relation_set(op, k, &ty);
        self.constrain(svals, constraints, symbol, allowed)
    }

    /// Narrow `symbol` to `allowed`. The value of `s ± c` is in `allowed`
    /// exactly when `s` is in `allowed ∓ c`, both wrapping to the width of
    /// the sum's type.
    fn constrain(
        &self,
        svals: &SValBuilder<'_, '_>,
        constraints: &ConstraintSet,
        symbol: SymbolId,
        allowed: RangeSet,
    ) -> Option<ConstraintSet> {
        if let SymExpr::SymInt {
            lhs,
            op: offset_op @ (BinOp::Add | BinOp::Sub),
            rhs: c,
            ty,
        } = svals.symbols().get(symbol)
        {
            let delta = match offset_op {
                BinOp::Add => c.wrapping_neg(),
                _ => c,
            };
            let lhs_ty = svals.symbols().symbol_type(lhs);
            let base = allowed.shifted(delta, &ty).intersect(&RangeSet::domain(&lhs_ty));
            return self.constrain(svals, constraints, lhs, base);
        }

        let ty = svals.symbols().symbol_type(symbol);
        let current = constraints
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| RangeSet::domain(&ty));
        let narrowed = current.intersect(&allowed);
        if narrowed.is_empty() {
            log::trace!("assumption {} in {} is infeasible", symbol, allowed);
            return None;
        }
        Some(ConstraintSet {
            ranges: constraints.ranges.insert(symbol, narrowed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{ExprId, FrameId, Program};
    use crate::memory::MemRegionManager;
    use crate::svals::SymbolManager;
    use test_log::test;

    #[test]
    fn test_range_set_operations() {
        let int = Type::Int;
        let not_five = RangeSet::point(5).complement(&int);
        assert!(!not_five.contains(5));
        assert!(not_five.contains(4) && not_five.contains(6));
        assert_eq!(not_five.min(), Some(i32::MIN as i64));

        let small = RangeSet::interval(0, 10).intersect(&not_five);
        assert_eq!(small.to_string(), "{ [0, 4], [6, 10] }");
        assert_eq!(RangeSet::interval(3, 3).single_value(), Some(3));
        assert!(RangeSet::interval(4, 3).is_empty());
    }

    #[test]
    fn test_contradicting_assumptions() {
        let program = Program::default();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RangeConstraintManager::new();

        let x = symbols.conjured(ExprId(0), FrameId(0), Type::Int, 0, None);
        let gt5 = svals.eval_binop(BinOp::Gt, SVal::symbol(x), SVal::int(5), &Type::Int);
        let lt3 = svals.eval_binop(BinOp::Lt, SVal::symbol(x), SVal::int(3), &Type::Int);

        let after = manager.assume(&svals, &ConstraintSet::default(), &gt5, true).unwrap();
        assert!(manager.assume(&svals, &after, &lt3, true).is_none());
        assert!(manager.assume(&svals, &after, &lt3, false).is_some());
        assert!(manager.assume(&svals, &after, &gt5, false).is_none());

        let eq7 = svals.eval_binop(BinOp::Eq, SVal::symbol(x), SVal::int(7), &Type::Int);
        let pinned = manager.assume(&svals, &after, &eq7, true).unwrap();
        assert_eq!(manager.get_sym_val(&svals, &pinned, x), Some(7));
        assert_eq!(manager.get_sym_val(&svals, &after, x), None);
    }

    #[test]
    fn test_offset_and_truthiness() {
        let program = Program::default();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RangeConstraintManager::new();
        let empty = ConstraintSet::default();

        let x = symbols.conjured(ExprId(1), FrameId(0), Type::Int, 0, None);
        // x + 1 == 10  =>  x == 9
        let plus = svals.eval_binop(BinOp::Add, SVal::symbol(x), SVal::int(1), &Type::Int);
        let cond = svals.eval_binop(BinOp::Eq, plus.clone(), SVal::int(10), &Type::Int);
        let after = manager.assume(&svals, &empty, &cond, true).unwrap();
        assert_eq!(manager.get_sym_val(&svals, &after, x), Some(9));
        assert_eq!(manager.get_sym_val(&svals, &after, plus.as_symbol().unwrap()), Some(10));

        // if (x) on the false branch pins x to zero
        let (yes, no) = manager.assume_dual(&svals, &empty, &SVal::symbol(x));
        assert!(yes.is_some());
        assert_eq!(manager.get_sym_val(&svals, &no.unwrap(), x), Some(0));

        // constants decide on their own
        assert!(manager.assume(&svals, &empty, &SVal::int(0), true).is_none());
        assert!(manager.assume(&svals, &empty, &SVal::null(), false).is_some());
    }

    #[test]
    fn test_offsets_wrap_like_concrete_arithmetic() {
        let int = Type::Int;
        let min = i32::MIN as i64;
        let max = i32::MAX as i64;
        assert_eq!(RangeSet::point(min).shifted(-1, &int), RangeSet::point(max));
        assert_eq!(RangeSet::interval(max - 1, max).shifted(2, &int), RangeSet::interval(min, min + 1));
        assert_eq!(
            RangeSet::interval(max - 1, max).shifted(1, &int).to_string(),
            format!("{{ [{}, {}], [{}, {}] }}", min, min, max, max)
        );

        let program = Program::default();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RangeConstraintManager::new();

        let x = symbols.conjured(ExprId(3), FrameId(0), Type::Int, 0, None);
        let pin = svals.eval_binop(BinOp::Eq, SVal::symbol(x), SVal::int(max), &int);
        let pinned = manager.assume(&svals, &ConstraintSet::default(), &pin, true).unwrap();

        // x == INT_MAX, so x + 1 wraps to INT_MIN
        let plus = svals.eval_binop(BinOp::Add, SVal::symbol(x), SVal::int(1), &int);
        let wraps = svals.eval_binop(BinOp::Eq, plus.clone(), SVal::int(min), &int);
        let (taken, skipped) = manager.assume_dual(&svals, &pinned, &wraps);
        assert!(taken.is_some());
        assert!(skipped.is_none());
        assert_eq!(manager.get_sym_val(&svals, &pinned, plus.as_symbol().unwrap()), Some(min));

        // x - 1 < 0 holds for x == INT_MIN only through the wrap
        let fresh = symbols.conjured(ExprId(4), FrameId(0), Type::Int, 0, None);
        let minus = svals.eval_binop(BinOp::Sub, SVal::symbol(fresh), SVal::int(1), &int);
        let negative = svals.eval_binop(BinOp::Lt, minus, SVal::int(0), &int);
        let after = manager.assume(&svals, &ConstraintSet::default(), &negative, false).unwrap();
        let range = after.get(fresh).unwrap();
        assert!(range.contains(min));
        assert!(range.contains(1) && range.contains(max));
        assert!(!range.contains(0));
    }

    #[test]
    fn test_symbolic_pointers() {
        let program = Program::default();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let svals = SValBuilder::new(&regions, &symbols);
        let manager = RangeConstraintManager::new();

        let p = symbols.conjured(ExprId(2), FrameId(0), Type::Int.pointer_to(), 0, None);
        let pointer = svals.symbol_value(p);
        let (non_null, null) = manager.assume_dual(&svals, &ConstraintSet::default(), &pointer);
        let null = null.unwrap();
        assert!(non_null.is_some());
        assert_eq!(manager.get_sym_val(&svals, &null, p), Some(0));
        assert!(manager.assume(&svals, &null, &pointer, true).is_none());
    }
}
