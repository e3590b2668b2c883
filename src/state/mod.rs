//! Path state
//!
//! This module provides everything that makes up one path's abstract state:
//! - [`environment`]: values of expressions being evaluated
//! - [`constraints`]: value ranges of symbols, [`RangeConstraintManager`]
//! - [`traits`]: checker-private facts stored in the state
//! - [`program_state`]: [`ProgramState`] and the interning
//!   [`ProgramStateManager`]
//! - [`reaper`]: [`SymbolReaper`], liveness for garbage collection

pub mod constraints;
pub mod environment;
pub mod program_state;
pub mod reaper;
pub mod traits;

pub use constraints::{ConstraintSet, Range, RangeConstraintManager, RangeSet};
pub use environment::{EnvKey, Environment};
pub use program_state::{ProgramState, ProgramStateManager, ProgramStateRef, Truth};
pub use reaper::SymbolReaper;
pub use traits::{GenericDataMap, ProgramStateTrait, TraitEntry, TraitKey, TraitValue};
