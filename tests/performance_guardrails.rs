use std::time::Instant;

use flow_css::{
    evaluate, eval::evaluate_with, eval::Scope, EvalOptions, FileServiceStub, FlowError, Registry,
    Scanner,
};

// ---------------------------------------------------------------------------
// Evaluation budget
// ---------------------------------------------------------------------------

#[test]
fn step_budget_bounds_evaluation() {
    let mut text = String::from("{");
    for i in 0..500 {
        text.push_str(&format!(" p{i}: {i},"));
    }
    text.push_str(" }");

    let options = EvalOptions {
        max_steps: 100,
        ..Default::default()
    };
    let err = evaluate_with(&text, &Scope::new(), &options).unwrap_err();
    match err {
        FlowError::MalformedDeclaration { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(evaluate(&text).is_ok());
}

#[test]
fn long_operator_chains_fail_without_crashing() {
    let mut text = String::from("{ width: 0");
    for _ in 0..500 {
        text.push_str(" + 1");
    }
    text.push_str(" }");

    match evaluate(&text).unwrap_err() {
        FlowError::MalformedDeclaration { reason, .. } => assert!(reason.contains("nests deeper")),
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Linear scaling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn many_files_scan_in_one_pass() {
    let mut fs = FileServiceStub::new();
    for i in 0..200 {
        fs = fs.with_file(
            format!("/app/src/c{i:03}.tsx"),
            format!("export const s = css({{ zIndex: {i} }});"),
        );
    }

    let registry = Registry::default();
    let scanner = Scanner::new("/app", registry.clone(), fs);
    let summary = scanner.scan_all().await.unwrap();
    assert_eq!(summary.files_scanned, 200);
    assert_eq!(registry.len(), 200);
}

#[tokio::test]
#[ignore]
async fn generated_css_grows_linearly() {
    // Guard against N^2 string building in generate_css.
    let counts = [10, 100, 1000];
    let mut timings = Vec::new();

    for &count in &counts {
        let registry = Registry::default();
        for i in 0..count {
            let entry = registry
                .prepare(evaluate(&format!("{{ order: {i} }}")).unwrap())
                .unwrap();
            registry.add_style(entry, "/app/a.ts");
        }
        let start = Instant::now();
        let css = registry.generate_css();
        timings.push(start.elapsed());
        assert_eq!(css.lines().count(), count);
    }

    let ratio = timings[2].as_secs_f64() / timings[1].as_secs_f64().max(1e-9);
    assert!(ratio < 50.0, "generate_css scaled superlinearly: {timings:?}");
}
