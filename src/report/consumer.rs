//! Diagnostic consumers
//!
//! A [`PathDiagnosticConsumer`] receives the diagnostics of every analyzed
//! function and writes them out when the translation unit is done. All
//! consumers share the same deduplication rule through [`DiagnosticSet`]:
//! two diagnostics with the same profile are one issue, and the one with
//! the shorter path is kept.

use super::diagnostic::{DiagnosticProfile, PathDiagnostic};
use crate::config::PathScheme;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write diagnostics: {0}")]
    Io(#[from] std::io::Error),
}

pub trait PathDiagnosticConsumer {
    fn name(&self) -> &'static str;

    /// How detailed the paths handed to this consumer should be.
    fn generation_scheme(&self) -> PathScheme {
        PathScheme::Extensive
    }

    fn handle_path_diagnostic(&mut self, diagnostic: PathDiagnostic);

    /// Write out everything received so far.
    fn flush_diagnostics(&mut self) -> Result<(), ReportError>;
}

/// Diagnostics in arrival order, one per profile
#[derive(Debug, Default)]
pub struct DiagnosticSet {
    diagnostics: Vec<PathDiagnostic>,
    index: FxHashMap<DiagnosticProfile, usize>,
}

impl DiagnosticSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `diagnostic` unless an equal issue with a path at most as long
    /// is already present. Returns whether the set changed.
    pub fn insert(&mut self, diagnostic: PathDiagnostic) -> bool {
        let profile = diagnostic.profile();
        match self.index.get(&profile) {
            Some(&slot) => {
                if diagnostic.full_size() < self.diagnostics[slot].full_size() {
                    self.diagnostics[slot] = diagnostic;
                    true
                } else {
                    false
                }
            }
            None => {
                self.index.insert(profile, self.diagnostics.len());
                self.diagnostics.push(diagnostic);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathDiagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<PathDiagnostic> {
        self.diagnostics
    }
}

/// Keeps diagnostics in memory for the caller.
#[derive(Debug)]
pub struct DiagnosticCollector {
    set: DiagnosticSet,
    scheme: PathScheme,
}

impl DiagnosticCollector {
    pub fn new(scheme: PathScheme) -> Self {
        Self {
            set: DiagnosticSet::new(),
            scheme,
        }
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &PathDiagnostic> {
        self.set.iter()
    }

    pub fn into_diagnostics(self) -> Vec<PathDiagnostic> {
        self.set.into_vec()
    }
}

impl PathDiagnosticConsumer for DiagnosticCollector {
    fn name(&self) -> &'static str {
        "collector"
    }

    fn generation_scheme(&self) -> PathScheme {
        self.scheme
    }

    fn handle_path_diagnostic(&mut self, diagnostic: PathDiagnostic) {
        self.set.insert(diagnostic);
    }

    fn flush_diagnostics(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::SourceLocation;
    use crate::report::diagnostic::{EventPiece, PathPiece};

    fn diagnostic(description: &str, line: u32, pieces: usize) -> PathDiagnostic {
        let location = SourceLocation::new(line, 1);
        PathDiagnostic {
            file: "test.c".to_string(),
            bug_type: "Test bug".to_string(),
            category: "Testing".to_string(),
            description: description.to_string(),
            location,
            issue_context: None,
            path: (0..pieces)
                .map(|_| PathPiece::Event(EventPiece::new(location, description)))
                .collect(),
        }
    }

    #[test]
    fn test_duplicates_keep_the_shorter_path() {
        let mut collector = DiagnosticCollector::new(PathScheme::Minimal);
        collector.handle_path_diagnostic(diagnostic("a", 1, 3));
        collector.handle_path_diagnostic(diagnostic("b", 2, 1));
        collector.handle_path_diagnostic(diagnostic("a", 1, 2));
        collector.handle_path_diagnostic(diagnostic("a", 1, 5));

        let kept = collector.into_diagnostics();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].description, "a");
        assert_eq!(kept[0].full_size(), 2);
        assert_eq!(kept[1].description, "b");
    }
}
