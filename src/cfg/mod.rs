//! Typed control-flow graphs
//!
//! This module turns a parsed [`TranslationUnit`](crate::frontend::TranslationUnit)
//! into the analysis inputs the engine walks:
//! - [`ir`]: [`Program`], the typed expression arena, blocks and terminators
//! - [`builder`]: name resolution, type checking and CFG construction
//! - [`liveness`]: live variables per block
//! - [`context`]: interned stack frames for inlined calls
//!
//! # Evaluation Order
//!
//! Block elements are listed in the order their values are computed:
//! operands before operators, arguments before calls. Program points are
//! keyed by (block, element index), so the engine never re-walks
//! expression trees.

pub mod builder;
pub mod context;
pub mod ir;
pub mod liveness;

pub use builder::{build_program, SemanticError};
pub use context::{CallSite, FrameId, LocationContextManager, StackFrame};
pub use ir::*;
pub use liveness::LiveVariables;
