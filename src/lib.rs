//! # Introduction
//!
//! crustcheck finds bugs in a subset of C by symbolic execution. Each
//! function is explored path by path: values the program cannot know yet
//! become symbols, branches split the path under the matching constraints,
//! and checkers watch every step for null dereferences, garbage values,
//! division by zero, escaping stack addresses and heap misuse. Findings
//! come out as path diagnostics in plist or plain text.
//!
//! ## Analysis pipeline
//!
//! ```text
//! Source → Lexer → Parser → AST → CFG builder → ExprEngine ⇄ Checkers → BugReporter → plist / text
//! ```
//!
//! 1. [`frontend`]: tokenises the source and builds an AST.
//! 2. [`cfg`]: type-checks the AST and lowers every function body to a
//!    control-flow graph with live-variable information.
//! 3. [`engine`]: explores each CFG over abstract
//!    [`ProgramState`](state::ProgramState)s and records an
//!    [`ExplodedGraph`](engine::ExplodedGraph).
//! 4. [`memory`], [`svals`], [`store`], [`state`]: the abstract domain:
//!    regions, symbolic values, memory bindings and range constraints.
//! 5. [`checkers`]: bug detectors hooked into the engine's callbacks.
//! 6. [`report`]: turns bug reports into deduplicated path diagnostics and
//!    writes them out.
//! 7. [`analysis`]: runs all of the above for one translation unit.
//!
//! ## Example
//!
//! ```
//! use crustcheck::{analyze_source, AnalyzerOptions};
//!
//! let result = analyze_source("int f(void) { int *p = 0; return *p; }", "f.c", &AnalyzerOptions::default())?;
//! assert_eq!(result.diagnostics.len(), 1);
//! # Ok::<(), crustcheck::AnalysisError>(())
//! ```

pub mod analysis;
pub mod cfg;
pub mod checkers;
pub mod config;
pub mod engine;
pub mod frontend;
pub mod memory;
pub mod report;
pub mod state;
pub mod store;
pub mod svals;

pub use analysis::{analyze_program, analyze_source, AnalysisError, AnalysisResult};
pub use config::AnalyzerOptions;
