//! Translation-unit driver
//!
//! Every defined function is analyzed as an entry point of its own, with
//! fresh region, symbol, frame and state managers. Functions share only the
//! read-only [`Program`] and the checker registry, so they can run on the
//! rayon pool when [`AnalyzerOptions::parallel`] is set. Results are merged
//! in declaration order and deduplicated through a [`DiagnosticCollector`],
//! so the output does not depend on scheduling.

use crate::cfg::{build_program, FunctionId, LocationContextManager, Program, SemanticError};
use crate::checkers::CheckerManager;
use crate::config::{AnalyzerOptions, ConfigError, PathScheme};
use crate::engine::{CoverageNote, EngineError, ExprEngine};
use crate::frontend::{parse_source, ParseError};
use crate::memory::MemRegionManager;
use crate::report::{
    render_plist, DiagnosticCollector, PathDiagnostic, PathDiagnosticConsumer, PlistDiagnostics, ReportError,
    TextDiagnostics,
};
use crate::state::ProgramStateManager;
use crate::store::store_manager;
use crate::svals::SymbolManager;
use log::{debug, info};
use rayon::prelude::*;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Findings for one translation unit
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub file: String,
    /// One per distinct issue, in the order the functions were declared
    pub diagnostics: Vec<PathDiagnostic>,
    /// Functions whose exploration was cut short
    pub coverage: Vec<CoverageNote>,
    /// How the diagnostic paths were generated
    pub path_scheme: PathScheme,
}

impl AnalysisResult {
    pub fn write_plist<W: Write>(&self, out: W) -> Result<(), ReportError> {
        let mut consumer = PlistDiagnostics::new(out);
        self.feed(&mut consumer)
    }

    pub fn write_text<W: Write>(&self, out: W) -> Result<(), ReportError> {
        let mut consumer = TextDiagnostics::new(out, self.path_scheme);
        self.feed(&mut consumer)
    }

    pub fn to_plist(&self) -> String {
        render_plist(&self.diagnostics)
    }

    fn feed(&self, consumer: &mut dyn PathDiagnosticConsumer) -> Result<(), ReportError> {
        for diagnostic in &self.diagnostics {
            consumer.handle_path_diagnostic(diagnostic.clone());
        }
        consumer.flush_diagnostics()
    }
}

/// Parse, lower and analyze `source`.
pub fn analyze_source(source: &str, file_name: &str, options: &AnalyzerOptions) -> Result<AnalysisResult, AnalysisError> {
    options.validate()?;
    let unit = parse_source(source)?;
    let program = build_program(&unit, file_name)?;
    analyze_program(&program, options)
}

pub fn analyze_program(program: &Program, options: &AnalyzerOptions) -> Result<AnalysisResult, AnalysisError> {
    let checkers = CheckerManager::from_names(&options.checkers)?;
    let functions: Vec<FunctionId> = program.defined_functions().collect();
    debug!(
        "{}: {} functions, {} checkers",
        program.file_name,
        functions.len(),
        checkers.len()
    );

    let outcomes: Vec<Result<FunctionOutcome, EngineError>> = if options.parallel {
        functions
            .par_iter()
            .map(|function| analyze_function(program, *function, options, &checkers))
            .collect()
    } else {
        functions
            .iter()
            .map(|function| analyze_function(program, *function, options, &checkers))
            .collect()
    };

    let mut collector = DiagnosticCollector::new(options.path_scheme);
    let mut coverage = Vec::new();
    for outcome in outcomes {
        let outcome = outcome?;
        for diagnostic in outcome.diagnostics {
            collector.handle_path_diagnostic(diagnostic);
        }
        coverage.extend(outcome.coverage);
    }
    let diagnostics = collector.into_diagnostics();
    info!(
        "{}: {} diagnostics, {} incomplete analyses",
        program.file_name,
        diagnostics.len(),
        coverage.len()
    );

    Ok(AnalysisResult {
        file: program.file_name.clone(),
        diagnostics,
        coverage,
        path_scheme: options.path_scheme,
    })
}

struct FunctionOutcome {
    diagnostics: Vec<PathDiagnostic>,
    coverage: Vec<CoverageNote>,
}

fn analyze_function(
    program: &Program,
    function: FunctionId,
    options: &AnalyzerOptions,
    checkers: &CheckerManager,
) -> Result<FunctionOutcome, EngineError> {
    let regions = MemRegionManager::new(program);
    let symbols = SymbolManager::new();
    let frames = LocationContextManager::new();
    let states = ProgramStateManager::new(&regions, &symbols, store_manager(options.store));

    let mut engine = ExprEngine::new(program, options, checkers, &frames, &states);
    engine.run(function)?;
    Ok(FunctionOutcome {
        diagnostics: engine.flush_reports(),
        coverage: engine.coverage().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_parallel_and_sequential_runs_agree() {
        let source = "\
int f(void) { int *p = 0; return *p; }
int g(int d) { return 10 / d; }
int h(int d) { if (d == 0) return 1 / d; return 0; }
";
        let sequential = analyze_source(source, "t.c", &AnalyzerOptions::default()).unwrap();
        let parallel = analyze_source(
            source,
            "t.c",
            &AnalyzerOptions {
                parallel: true,
                ..AnalyzerOptions::default()
            },
        )
        .unwrap();
        assert_eq!(sequential.diagnostics, parallel.diagnostics);
        assert_eq!(sequential.diagnostics.len(), 2);
        assert_eq!(sequential.to_plist(), parallel.to_plist());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let options = AnalyzerOptions {
            max_nodes: 0,
            ..AnalyzerOptions::default()
        };
        assert!(matches!(
            analyze_source("int f(void) { return 0; }", "t.c", &options),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn test_front_end_errors_propagate() {
        let options = AnalyzerOptions::default();
        assert!(matches!(
            analyze_source("int f( { return 0; }", "t.c", &options),
            Err(AnalysisError::Parse(_))
        ));
        assert!(matches!(
            analyze_source("int f(void) { return y; }", "t.c", &options),
            Err(AnalysisError::Semantic(_))
        ));
    }

    #[test]
    fn test_text_output_lists_each_issue() {
        let result = analyze_source("int f(void) { int *p = 0; return *p; }", "t.c", &AnalyzerOptions::default()).unwrap();
        let mut out = Vec::new();
        result.write_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("t.c:1:"));
        assert!(text.contains("warning: Dereference of null pointer"));
    }

    #[test]
    fn test_text_output_follows_the_configured_scheme() {
        let source = "int f(int c) {\n    int *p = 0;\n    if (c) {\n        c = 2;\n    }\n    return *p;\n}\n";
        let options = AnalyzerOptions {
            path_scheme: PathScheme::Minimal,
            ..AnalyzerOptions::default()
        };
        let result = analyze_source(source, "t.c", &options).unwrap();
        assert_eq!(result.path_scheme, PathScheme::Minimal);

        let mut written = Vec::new();
        result.write_text(&mut written).unwrap();
        let mut expected = TextDiagnostics::new(Vec::new(), PathScheme::Minimal);
        assert_eq!(expected.generation_scheme(), PathScheme::Minimal);
        for diagnostic in &result.diagnostics {
            expected.handle_path_diagnostic(diagnostic.clone());
        }
        expected.flush_diagnostics().unwrap();
        assert_eq!(written, expected.into_inner());
    }
}
