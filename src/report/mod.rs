//! Bug reporting
//!
//! Turns defects found by checkers into diagnostics a person can follow:
//! - [`bug_reporter`]: [`BugReport`]s, their equivalence classes and the
//!   [`BugReporter`] that flushes one diagnostic per class
//! - [`generate`]: shortest paths through the exploded graph and the
//!   pieces that explain them
//! - [`diagnostic`]: the finished [`PathDiagnostic`]
//! - [`consumer`], [`plist`], [`text`]: where diagnostics go

pub mod bug_reporter;
pub mod consumer;
pub mod diagnostic;
pub mod generate;
pub mod plist;
pub mod text;

pub use bug_reporter::{BugReport, BugReportEquivClass, BugReporter, BugReporterVisitor, BugType, PathContext};
pub use consumer::{DiagnosticCollector, DiagnosticSet, PathDiagnosticConsumer, ReportError};
pub use diagnostic::{
    CallPiece, ControlEdge, ControlFlowPiece, DiagnosticProfile, EventPiece, IssueContext, MacroPiece,
    PathDiagnostic, PathPiece,
};
pub use generate::{generate_path_diagnostic, shortest_path, PathWalk};
pub use plist::{render_plist, PlistDiagnostics};
pub use text::TextDiagnostics;
