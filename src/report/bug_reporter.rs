//! Bug reports and their deduplication
//!
//! Checkers hand [`BugReport`]s to the [`BugReporter`] while the engine is
//! still exploring. Reports with the same profile (bug type, category,
//! description and location) land in one [`BugReportEquivClass`], however
//! many paths reach them. When the analysis of a function is over,
//! [`BugReporter::flush_reports`] turns every class into exactly one
//! [`PathDiagnostic`], built from the report whose error node is closest
//! to the start of the function.

use super::diagnostic::{DiagnosticProfile, EventPiece, PathDiagnostic, PathPiece};
use super::generate::{generate_path_diagnostic, shortest_path};
use crate::cfg::{FrameId, LocationContextManager, Program};
use crate::config::PathScheme;
use crate::engine::{ExplodedGraph, NodeId};
use crate::frontend::ast::{SourceLocation, SourceRange};
use crate::memory::RegionId;
use crate::state::ProgramStateManager;
use crate::svals::SymbolId;
use rustc_hash::FxHashMap;
use std::fmt;

/// A kind of defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BugType {
    pub name: &'static str,
    pub category: &'static str,
}

impl BugType {
    pub const fn new(name: &'static str, category: &'static str) -> Self {
        Self { name, category }
    }
}

/// Everything the exploded graph can tell about the nodes of one path
pub struct PathContext<'g, 'a, 'p> {
    pub program: &'p Program,
    pub graph: &'g ExplodedGraph,
    pub frames: &'g LocationContextManager,
    pub states: &'g ProgramStateManager<'a, 'p>,
}

impl PathContext<'_, '_, '_> {
    pub fn node_range(&self, node: NodeId) -> Option<SourceRange> {
        self.graph.node(node).point.range(self.program, self.frames)
    }

    pub fn node_location(&self, node: NodeId) -> Option<SourceLocation> {
        self.node_range(node).map(|range| range.begin)
    }

    /// Name of the function a frame runs.
    pub fn function_name(&self, frame: FrameId) -> Option<&str> {
        let function = self.frames.frame(frame)?.function;
        Some(self.program.function(function).name.as_str())
    }
}

/// Adds events to a path while it is walked backwards.
///
/// `visit_node` sees every edge `pred -> succ` of the chosen path, from the
/// error node towards the root, and may explain what happened on it.
pub trait BugReporterVisitor {
    fn visit_node(
        &mut self,
        succ: NodeId,
        pred: NodeId,
        ctx: &PathContext<'_, '_, '_>,
        report: &BugReport,
    ) -> Option<EventPiece>;
}

/// A defect found at one node of the exploded graph
pub struct BugReport {
    pub bug_type: BugType,
    pub description: String,
    /// Node at which the defect was detected
    pub node: NodeId,
    pub location: SourceLocation,
    pub ranges: Vec<SourceRange>,
    interesting_regions: Vec<RegionId>,
    interesting_symbols: Vec<SymbolId>,
    visitors: Vec<Box<dyn BugReporterVisitor>>,
}

impl fmt::Debug for BugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BugReport")
            .field("bug_type", &self.bug_type)
            .field("description", &self.description)
            .field("node", &self.node)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl BugReport {
    pub fn new(bug_type: BugType, description: impl Into<String>, node: NodeId, location: SourceLocation) -> Self {
        Self {
            bug_type,
            description: description.into(),
            node,
            location,
            ranges: Vec::new(),
            interesting_regions: Vec::new(),
            interesting_symbols: Vec::new(),
            visitors: Vec::new(),
        }
    }

    pub fn add_range(&mut self, range: SourceRange) {
        self.ranges.push(range);
    }

    /// Ask the path builder to explain where the value of `region` came from.
    pub fn mark_interesting_region(&mut self, region: RegionId) {
        if !self.interesting_regions.contains(&region) {
            self.interesting_regions.push(region);
        }
    }

    pub fn mark_interesting_symbol(&mut self, symbol: SymbolId) {
        if !self.interesting_symbols.contains(&symbol) {
            self.interesting_symbols.push(symbol);
        }
    }

    pub fn is_interesting_region(&self, region: RegionId) -> bool {
        self.interesting_regions.contains(&region)
    }

    pub fn is_interesting_symbol(&self, symbol: SymbolId) -> bool {
        self.interesting_symbols.contains(&symbol)
    }

    pub fn interesting_regions(&self) -> &[RegionId] {
        &self.interesting_regions
    }

    pub fn add_visitor(&mut self, visitor: Box<dyn BugReporterVisitor>) {
        self.visitors.push(visitor);
    }

    pub(crate) fn take_visitors(&mut self) -> Vec<Box<dyn BugReporterVisitor>> {
        std::mem::take(&mut self.visitors)
    }

    pub fn profile(&self) -> DiagnosticProfile {
        DiagnosticProfile {
            bug_type: self.bug_type.name.to_string(),
            category: self.bug_type.category.to_string(),
            description: self.description.clone(),
            location: self.location,
        }
    }
}

/// Reports that describe the same defect, in the order they were found
#[derive(Debug)]
pub struct BugReportEquivClass {
    profile: DiagnosticProfile,
    reports: Vec<BugReport>,
}

impl BugReportEquivClass {
    pub fn profile(&self) -> &DiagnosticProfile {
        &self.profile
    }

    pub fn reports(&self) -> &[BugReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct BugReporter {
    classes: Vec<BugReportEquivClass>,
    index: FxHashMap<DiagnosticProfile, usize>,
}

impl BugReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_report(&mut self, report: BugReport) {
        let profile = report.profile();
        log::debug!(
            "{}: {} ({})",
            report.location,
            report.description,
            report.bug_type.name
        );
        match self.index.get(&profile) {
            Some(&class) => self.classes[class].reports.push(report),
            None => {
                self.index.insert(profile.clone(), self.classes.len());
                self.classes.push(BugReportEquivClass {
                    profile,
                    reports: vec![report],
                });
            }
        }
    }

    pub fn equivalence_classes(&self) -> &[BugReportEquivClass] {
        &self.classes
    }

    /// Number of reports emitted so far, duplicates included.
    pub fn report_count(&self) -> usize {
        self.classes.iter().map(BugReportEquivClass::len).sum()
    }

    /// One diagnostic per equivalence class, in the order the classes were
    /// first seen. The reporter is empty afterwards.
    pub fn flush_reports(&mut self, ctx: &PathContext<'_, '_, '_>, scheme: PathScheme) -> Vec<PathDiagnostic> {
        self.index.clear();
        let classes = std::mem::take(&mut self.classes);
        classes
            .into_iter()
            .filter_map(|class| {
                let mut best: Option<(BugReport, Option<Vec<NodeId>>)> = None;
                for report in class.reports {
                    let path = shortest_path(ctx.graph, report.node);
                    let length = path.as_ref().map_or(usize::MAX, Vec::len);
                    let shorter = match &best {
                        None => true,
                        Some((_, current)) => length < current.as_ref().map_or(usize::MAX, Vec::len),
                    };
                    if shorter {
                        best = Some((report, path));
                    }
                }
                let (mut report, path) = best?;
                Some(match path {
                    Some(path) => generate_path_diagnostic(ctx, &mut report, &path, scheme),
                    None => {
                        log::warn!("no path to '{}'; reporting the location only", report.description);
                        single_event_diagnostic(ctx.program, &report)
                    }
                })
            })
            .collect()
    }
}

/// A diagnostic with nothing but the final event.
pub(crate) fn single_event_diagnostic(program: &Program, report: &BugReport) -> PathDiagnostic {
    let mut event = EventPiece::new(report.location, report.description.clone());
    event.ranges = report.ranges.clone();
    PathDiagnostic {
        file: program.file_name.clone(),
        bug_type: report.bug_type.name.to_string(),
        category: report.bug_type.category.to_string(),
        description: report.description.clone(),
        location: report.location,
        issue_context: None,
        path: vec![PathPiece::Event(event)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PointKind, ProgramPoint};
    use crate::memory::MemRegionManager;
    use crate::store::RegionStoreManager;
    use crate::svals::SymbolManager;
    use test_log::test;

    const TEST_BUG: BugType = BugType::new("Test bug", "Testing");

    #[test]
    fn test_equal_profiles_share_a_class() {
        let mut reporter = BugReporter::new();
        let here = SourceLocation::new(3, 4);
        reporter.emit_report(BugReport::new(TEST_BUG, "bad thing", NodeId(5), here));
        reporter.emit_report(BugReport::new(TEST_BUG, "bad thing", NodeId(9), here));
        reporter.emit_report(BugReport::new(TEST_BUG, "bad thing", NodeId(9), SourceLocation::new(4, 1)));
        reporter.emit_report(BugReport::new(TEST_BUG, "other thing", NodeId(9), here));

        let classes = reporter.equivalence_classes();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes[0].len(), 2);
        assert_eq!(classes[0].reports()[0].node, NodeId(5));
        assert_eq!(reporter.report_count(), 4);
    }

    #[test]
    fn test_flush_emits_one_diagnostic_per_class() {
        let program = Program::default();
        let frames = LocationContextManager::new();
        let regions = MemRegionManager::new(&program);
        let symbols = SymbolManager::new();
        let states = ProgramStateManager::new(&regions, &symbols, Box::new(RegionStoreManager::new()));
        let state = states.initial_state();

        // root -> a -> b -> far, and root -> near
        let mut graph = ExplodedGraph::new();
        let frame = FrameId(0);
        let at = |block: u32| {
            ProgramPoint::new(
                PointKind::BlockEntrance {
                    block: crate::cfg::BlockId(block),
                },
                frame,
            )
        };
        let (root, _) = graph.get_node(ProgramPoint::new(PointKind::FunctionEntry, frame), state.clone(), false);
        graph.add_root(root);
        let (a, _) = graph.get_node(at(1), state.clone(), false);
        let (b, _) = graph.get_node(at(2), state.clone(), false);
        let (far, _) = graph.get_node(at(3), state.clone(), true);
        let (near, _) = graph.get_node(at(4), state, true);
        graph.add_edge(root, a);
        graph.add_edge(a, b);
        graph.add_edge(b, far);
        graph.add_edge(root, near);

        let mut reporter = BugReporter::new();
        let here = SourceLocation::new(1, 1);
        reporter.emit_report(BugReport::new(TEST_BUG, "bad thing", far, here));
        reporter.emit_report(BugReport::new(TEST_BUG, "bad thing", near, here));

        let ctx = PathContext {
            program: &program,
            graph: &graph,
            frames: &frames,
            states: &states,
        };
        let diagnostics = reporter.flush_reports(&ctx, PathScheme::Minimal);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].description, "bad thing");
        assert_eq!(diagnostics[0].last_event().map(|e| e.location), Some(here));
        assert!(reporter.equivalence_classes().is_empty());
    }
}
