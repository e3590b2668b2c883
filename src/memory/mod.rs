//! Abstract memory model
//!
//! This module provides the location side of the analysis:
//! - [`region`]: [`MemRegion`], a closed sum type of memory spaces and the
//!   regions inside them
//! - [`manager`]: [`MemRegionManager`], which interns regions into
//!   [`RegionId`] handles
//!
//! # Region Tree
//!
//! Every region hangs off a memory space through its super-region chain:
//! ```text
//! StackLocals(f)  ── x ── x.field ── x.field[2]
//! Heap            ── SymRegion{$3} ── element{..}
//! Globals(Immutable) ── "literal"
//! ```
//!
//! # Type Sizes
//!
//! Offsets use the fixed sizes of [`Program::size_of`](crate::cfg::Program::size_of):
//! - `int`: 4 bytes
//! - `char`: 1 byte
//! - `pointer`: 8 bytes (regardless of pointee type)
//! - `struct`: sum of field sizes (no padding or alignment)

pub mod manager;
pub mod region;

pub use manager::MemRegionManager;
pub use region::{GlobalsKind, MemRegion, RegionId, RegionIndex, RegionOffset};
