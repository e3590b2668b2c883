// End-to-end tests through the translation-unit driver

use crustcheck::config::AnalyzerOptions;
use crustcheck::engine::CoverageKind;
use crustcheck::{analyze_source, AnalysisResult};

fn analyze(source: &str) -> AnalysisResult {
    analyze_source(source, "test.c", &AnalyzerOptions::default()).expect("Analysis failed")
}

fn descriptions(result: &AnalysisResult) -> Vec<&str> {
    result.diagnostics.iter().map(|d| d.description.as_str()).collect()
}

#[test]
fn test_null_dereference_path() {
    let result = analyze("int main(void) {\n    int *p = 0;\n    *p = 5;\n    return 0;\n}\n");
    assert_eq!(result.diagnostics.len(), 1);
    let diagnostic = &result.diagnostics[0];
    assert_eq!(diagnostic.bug_type, "Dereference of null pointer");
    assert_eq!(diagnostic.category, "Logic error");
    assert_eq!((diagnostic.location.line, diagnostic.location.column), (3, 5));

    let messages = diagnostic.messages();
    assert!(messages.contains(&"Variable 'p' initialized to a null pointer value"));
    assert_eq!(messages.last().copied(), Some("Dereference of null pointer (loaded from variable 'p')"));
}

#[test]
fn test_initialized_on_both_branches_is_clean() {
    let result = analyze("int f(int c) { int x; if (c) x = 1; else x = 2; return x; }");
    assert!(result.diagnostics.is_empty(), "{:?}", descriptions(&result));
}

#[test]
fn test_garbage_return_is_reported() {
    let result = analyze("int f(int c) { int x; if (c) x = 1; return x; }");
    assert_eq!(descriptions(&result), vec!["Undefined or garbage value returned to caller"]);
}

#[test]
fn test_garbage_switch_condition_is_reported() {
    let result = analyze("int f(void) { int x; switch (x) { case 1: return 1; default: return 0; } }");
    assert_eq!(descriptions(&result), vec!["Branch condition evaluates to a garbage value"]);

    let clean = analyze("int f(int x) { switch (x) { case 1: return 1; default: return 0; } }");
    assert!(clean.diagnostics.is_empty(), "{:?}", descriptions(&clean));
}

#[test]
fn test_opaque_call_forgets_constants() {
    let clean = analyze("void g(int *p); int f(void) { int x = 1; g(&x); return 10 / (x - 1); }");
    assert!(clean.diagnostics.is_empty(), "{:?}", descriptions(&clean));

    let flagged = analyze("void g(int *p); int f(void) { int x = 1; int y = 0; g(&y); return 10 / (x - 1); }");
    assert_eq!(descriptions(&flagged), vec!["Division by zero"]);
}

#[test]
fn test_symbolic_overflow_matches_concrete_overflow() {
    let concrete = analyze("int f(void) { int x = 2147483647; if (x + 1 == -2147483647 - 1) return 10 / (x - x); return 0; }");
    assert_eq!(descriptions(&concrete), vec!["Division by zero"]);

    let symbolic = analyze(
        "int f(int x) { if (x == 2147483647) { if (x + 1 == -2147483647 - 1) return 10 / (x - x); } return 0; }",
    );
    assert_eq!(descriptions(&symbolic), vec!["Division by zero"]);
}

#[test]
fn test_double_free_is_reported_once() {
    let result = analyze(
        "void f(void) {\n    int *p = malloc(sizeof(int));\n    free(p);\n    free(p);\n}\n",
    );
    assert_eq!(descriptions(&result), vec!["Attempt to free released memory"]);
    let messages = result.diagnostics[0].messages();
    assert!(messages.contains(&"Memory is allocated"));
    assert!(messages.contains(&"Memory is released"));
}

#[test]
fn test_lost_allocation_leaks() {
    let result = analyze("int f(void) {\n    int *p = malloc(4);\n    *p = 1;\n    return 0;\n}\n");
    assert_eq!(descriptions(&result), vec!["Potential memory leak"]);
    assert_eq!(result.diagnostics[0].location.line, 2);
}

#[test]
fn test_returned_or_freed_allocations_do_not_leak() {
    assert!(analyze("int *f(void) { int *p = malloc(4); return p; }").diagnostics.is_empty());
    assert!(analyze("void f(void) { int *p = malloc(4); free(p); }").diagnostics.is_empty());
    assert!(analyze("int *g; void f(void) { g = malloc(4); }").diagnostics.is_empty());
}

#[test]
fn test_allocation_reachable_by_opaque_call_escapes() {
    let source = "void keep(int **slot); void f(void) { int *p = malloc(4); keep(&p); }";
    let result = analyze(source);
    assert!(result.diagnostics.is_empty(), "{:?}", descriptions(&result));
}

#[test]
fn test_use_after_free() {
    let result = analyze("int f(void) { int *p = malloc(4); free(p); return *p; }");
    assert_eq!(descriptions(&result), vec!["Use of memory after it is freed"]);
}

#[test]
fn test_free_of_stack_address() {
    let result = analyze("void f(void) { int x; free(&x); }");
    assert_eq!(
        descriptions(&result),
        vec!["Argument to free() is the address of the local variable 'x', which is not memory allocated by malloc()"]
    );
}

#[test]
fn test_exit_ends_the_path() {
    let result = analyze("int f(int *p) { if (!p) exit(1); return *p; }");
    assert!(result.diagnostics.is_empty(), "{:?}", descriptions(&result));
    let result = analyze("int f(void) { int *p = 0; exit(1); return *p; }");
    assert!(result.diagnostics.is_empty(), "{:?}", descriptions(&result));
}

#[test]
fn test_stack_address_returned() {
    let result = analyze("int *f(void) { int x = 0; return &x; }");
    assert_eq!(
        descriptions(&result),
        vec!["Address of stack memory associated with local variable 'x' returned to caller"]
    );
}

#[test]
fn test_duplicate_paths_collapse() {
    let result = analyze("int f(int c) { int *p = 0; int k; if (c) k = 1; else k = 2; *p = k; return 0; }");
    assert_eq!(result.diagnostics.len(), 1);
}

#[test]
fn test_budget_is_reported_as_coverage() {
    let options = AnalyzerOptions {
        max_nodes: 5,
        ..AnalyzerOptions::default()
    };
    let source = "int f(int n) { int s = 0; for (int i = 0; i < n; i++) s += i; return s; }\nint g(void) { int *p = 0; return *p; }";
    let result = analyze_source(source, "test.c", &options).expect("Analysis failed");
    assert!(result
        .coverage
        .iter()
        .any(|note| note.function == "f" && note.kind == CoverageKind::NodeBudget));
    assert!(result.coverage.iter().all(|note| note.to_string().contains("analysis of")));
}

#[test]
fn test_plist_document_shape() {
    let result = analyze("int main(void) {\n    int *p = 0;\n    *p = 5;\n    return 0;\n}\n");
    let mut out = Vec::new();
    result.write_plist(&mut out).expect("Write failed");
    let plist = String::from_utf8(out).expect("Invalid UTF-8");

    assert!(plist.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
    assert!(plist.contains(" <key>files</key>\n <array>\n  <string>test.c</string>\n </array>\n"));
    assert!(plist.contains(
        "   <key>description</key><string>Dereference of null pointer (loaded from variable &apos;p&apos;)</string>\n"
    ));
    assert!(plist.contains("   <key>category</key><string>Logic error</string>\n"));
    assert!(plist.contains("   <key>type</key><string>Dereference of null pointer</string>\n"));
    assert!(plist.contains("  <key>issue_context</key><string>main</string>\n"));
    assert!(plist.ends_with("</plist>"));
    assert_eq!(plist, result.to_plist());
}

#[test]
fn test_analysis_is_deterministic() {
    let source = "\
int g;
int f(int a, int *q) {
    int r = 0;
    if (a > 2) r = *q;
    if (a < 1) r = 10 / a;
    switch (a) { case 1: g = 1; break; default: q = 0; }
    return r + *q;
}
";
    let first = analyze(source);
    let second = analyze(source);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert!(!first.diagnostics.is_empty());
}
