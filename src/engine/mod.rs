//! Path-sensitive exploration
//!
//! The engine walks the CFG of one top-level function, carrying a
//! [`ProgramState`](crate::state::ProgramState) along every path and
//! recording what it sees in an [`ExplodedGraph`]:
//!
//! ```text
//! FunctionEntry → BlockEntrance → PreStmt/PostStmt … → BlockExit → BlockEdge → BlockEntrance …
//!                                      │                                   (one edge per feasible branch)
//!                                      └─ call: CallEnter → callee … → EndFunction → CallExit → PostStmt
//! ```
//!
//! - [`program_point`]: where a node is
//! - [`graph`]: the exploded graph itself
//! - [`worklist`]: pending nodes and per-path block counts
//! - [`expr_engine`]: the worklist loop, blocks, branches and budgets
//! - [`transfer`]: the effect of each CFG element on the state
//! - [`calls`]: inlining and conservative evaluation of calls

pub mod calls;
pub mod expr_engine;
pub mod graph;
pub mod program_point;
pub mod transfer;
pub mod worklist;

pub use expr_engine::{CoverageKind, CoverageNote, EngineError, ExprEngine};
pub use graph::{ExplodedGraph, ExplodedNode, NodeId};
pub use program_point::{block_start, terminator_range, PointKind, ProgramPoint};
pub use worklist::{BlockCounter, WorkList, WorkListUnit};
