//! Symbolic values
//!
//! This module provides the value side of the analysis:
//! - [`sval`]: [`SVal`], the value of an expression or a location
//! - [`symbols`]: symbols for unknown values, interned by [`SymbolManager`]
//! - [`builder`]: [`SValBuilder`], operator evaluation over values
//!
//! # Value Kinds
//!
//! ```text
//! SVal ─┬─ Undefined / Unknown
//!       ├─ Loc ─┬─ Region(r)          &x, p->f, SymRegion{$2}
//!       │       └─ ConcreteInt(n)     NULL
//!       └─ NonLoc ─┬─ ConcreteInt(n)
//!                  ├─ Symbol($n)      reg_$0<x>, conj_$1{int}, ($0) + 1
//!                  ├─ LocAsInteger
//!                  └─ LazyCompound    struct contents in a past store
//! ```

pub mod builder;
pub mod sval;
pub mod symbols;

pub use builder::{wrap_int, SValBuilder};
pub use sval::{Loc, NonLoc, SVal};
pub use symbols::{SymExpr, SymbolId, SymbolManager};
