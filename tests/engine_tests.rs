// Exploded-graph level tests: build the managers by hand, run the engine on
// one function and inspect the graph it leaves behind.

use crustcheck::cfg::{build_program, CfgElement, ExprKind, FunctionId, LocationContextManager, Program, VarId};
use crustcheck::checkers::CheckerManager;
use crustcheck::config::{AnalyzerOptions, LoopExhaustion};
use crustcheck::engine::{CoverageKind, ExprEngine, NodeId, PointKind, ProgramPoint};
use crustcheck::frontend::{parse_source, Type};
use crustcheck::memory::MemRegionManager;
use crustcheck::report::shortest_path;
use crustcheck::state::ProgramStateManager;
use crustcheck::store::store_manager;
use crustcheck::svals::{Loc, SVal, SymbolManager};

fn explore<R>(
    source: &str,
    function: &str,
    options: &AnalyzerOptions,
    inspect: impl FnOnce(&Program, FunctionId, &mut ExprEngine<'_, '_>) -> R,
) -> R {
    let unit = parse_source(source).expect("Parsing failed");
    let program = build_program(&unit, "test.c").expect("Lowering failed");
    let id = program.function_by_name(function).expect("No such function");
    let regions = MemRegionManager::new(&program);
    let symbols = SymbolManager::new();
    let frames = LocationContextManager::new();
    let states = ProgramStateManager::new(&regions, &symbols, store_manager(options.store));
    let checkers = CheckerManager::from_names(&options.checkers).expect("Unknown checker");

    let mut engine = ExprEngine::new(&program, options, &checkers, &frames, &states);
    engine.run(id).expect("Engine failed");
    inspect(&program, id, &mut engine)
}

fn local(program: &Program, function: FunctionId, name: &str) -> VarId {
    let decl = program.function(function);
    let body = decl.body.as_ref().expect("No body");
    decl.params
        .iter()
        .chain(body.locals.iter())
        .copied()
        .find(|var| program.var(*var).name == name)
        .expect("No such variable")
}

fn element_at<'p>(program: &'p Program, function: FunctionId, point: &ProgramPoint) -> Option<&'p CfgElement> {
    let (block, index) = point.statement()?;
    program
        .function(function)
        .body
        .as_ref()?
        .cfg
        .block(block)?
        .elements
        .get(index as usize)
}

#[test]
fn test_null_store_is_reported_at_the_dereference() {
    let source = "int f(void) {\n    int *p = 0;\n    *p = 5;\n    return 0;\n}\n";
    explore(source, "f", &AnalyzerOptions::default(), |program, f, engine| {
        let classes = engine.reporter().equivalence_classes();
        assert_eq!(classes.len(), 1);
        let report = &classes[0].reports()[0];
        let error = engine.graph().node(report.node);
        assert!(error.sink);

        let p = engine.states().regions().var_region(local(program, f, "p"), error.point.frame);
        let bound = engine
            .states()
            .get_sval(&error.state, Loc::Region(p), &Type::Int.pointer_to());
        assert_eq!(bound, SVal::null());

        let diagnostics = engine.flush_reports();
        assert_eq!(diagnostics.len(), 1);
        let last = diagnostics[0].path.last().expect("Empty path");
        assert_eq!(last.location().line, 3);
        assert_eq!(last.location().column, 5);
        assert_eq!(
            last.message(),
            Some("Dereference of null pointer (loaded from variable 'p')")
        );
    });
}

#[test]
fn test_both_branches_initialize_before_the_join() {
    let source = "int f(int c) { int x; if (c) x = 1; else x = 2; return x; }";
    explore(source, "f", &AnalyzerOptions::default(), |program, f, engine| {
        assert_eq!(engine.reporter().report_count(), 0);
        let at_return = engine
            .graph()
            .iter()
            .filter(|(_, node)| node.point.tag.is_none() && matches!(node.point.kind, PointKind::PostStmt { .. }))
            .filter(|(_, node)| matches!(element_at(program, f, &node.point), Some(CfgElement::Return { .. })))
            .count();
        assert_eq!(at_return, 2);
    });
}

#[test]
fn test_opaque_call_invalidates_passed_address() {
    let source = "void g(int *p); int f(void) { int x = 1; g(&x); return x; }";
    explore(source, "f", &AnalyzerOptions::default(), |program, f, engine| {
        let x = local(program, f, "x");
        let after_call: Vec<NodeId> = engine
            .graph()
            .iter()
            .filter(|(_, node)| node.point.tag.is_none() && matches!(node.point.kind, PointKind::PostStmt { .. }))
            .filter(|(_, node)| {
                matches!(element_at(program, f, &node.point), Some(CfgElement::Expr { expr, .. })
                    if matches!(program.expr(*expr).kind, ExprKind::Call { .. }))
            })
            .map(|(id, _)| id)
            .collect();
        assert_eq!(after_call.len(), 1);

        let node = engine.graph().node(after_call[0]);
        let region = engine.states().regions().var_region(x, node.point.frame);
        let value = engine.states().get_sval(&node.state, Loc::Region(region), &Type::Int);
        assert!(value.as_symbol().is_some(), "x still holds {:?}", value);
        assert_ne!(value, SVal::int(1));
    });
}

#[test]
fn test_infinite_loop_terminates_with_coverage_note() {
    let source = "int f(void) { int i = 0; while (1) { i++; } return i; }";
    for policy in [LoopExhaustion::Sink, LoopExhaustion::Widen] {
        let options = AnalyzerOptions {
            loop_exhaustion: policy,
            ..AnalyzerOptions::default()
        };
        explore(source, "f", &options, |_, _, engine| {
            assert!(engine.graph().len() < 1000);
            assert!(engine
                .coverage()
                .iter()
                .any(|note| note.kind == CoverageKind::BlockLimit && note.function == "f"));
        });
    }
}

#[test]
fn test_node_budget_abandons_the_function() {
    let options = AnalyzerOptions {
        max_nodes: 3,
        ..AnalyzerOptions::default()
    };
    let source = "int f(int a) { int x = 0; while (x < a) { x = x + 1; } return 10 / x; }";
    explore(source, "f", &options, |_, _, engine| {
        assert_eq!(engine.coverage().len(), 1);
        assert_eq!(engine.coverage()[0].kind, CoverageKind::NodeBudget);
        assert!(engine.flush_reports().is_empty());
    });
}

#[test]
fn test_equivalent_reports_share_one_class() {
    let source = "int f(int c) { int *p = 0; int k; if (c) k = 1; else k = 2; *p = k; return 0; }";
    explore(source, "f", &AnalyzerOptions::default(), |_, _, engine| {
        let classes = engine.reporter().equivalence_classes();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].len(), 2);
        assert_eq!(engine.flush_reports().len(), 1);
    });
}

#[test]
fn test_report_paths_follow_graph_edges() {
    let source = "\
int f(int c) {
    int *p = 0;
    int n = 0;
    while (n < 2) { n++; }
    if (c > 3) { p = &n; }
    return *p;
}
";
    explore(source, "f", &AnalyzerOptions::default(), |_, _, engine| {
        assert!(engine.reporter().report_count() >= 1);
        for class in engine.reporter().equivalence_classes() {
            for report in class.reports() {
                let path = shortest_path(engine.graph(), report.node).expect("Unreachable error node");
                assert!(engine.graph().roots().contains(&path[0]));
                assert_eq!(path.last(), Some(&report.node));
                for pair in path.windows(2) {
                    assert!(engine.graph().node(pair[1]).preds.contains(&pair[0]));
                }
            }
        }
    });
}

#[test]
fn test_inlined_callee_reports_inside_the_call() {
    let source = "int deref(int *q) { return *q; } int f(void) { int *p = 0; return deref(p); }";
    explore(source, "f", &AnalyzerOptions::default(), |_, _, engine| {
        let diagnostics = engine.flush_reports();
        assert_eq!(diagnostics.len(), 1);
        let messages = diagnostics[0].messages();
        assert!(messages.contains(&"Calling 'deref'"));
        assert_eq!(
            messages.last().copied(),
            Some("Dereference of null pointer (loaded from variable 'q')")
        );
    });
}
