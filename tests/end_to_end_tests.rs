mod test_utils;

use smartcast_typechecker::ast::builder::*;
use smartcast_typechecker::ast::Program;
use smartcast_typechecker::{
    CheckerConfig, CollectingDiagnosticHandler, CompilationError, DiagnosticHandler,
    MismatchKind, Type, TypeChecker,
};
use std::sync::Arc;
use test_utils::*;

/// `f(Foo $a, Foo $b)` proves `$a->x` and `$b->x` non-null separately, then passes `$b->x`
/// to `g(Bar)` outside its own check.
fn foo_bar_scenario() -> Program {
    let f = function("f")
        .param("a", Some(Type::instance("Foo")))
        .param("b", Some(Type::instance("Foo")))
        .body(vec![
            if_stmt(
                not_identical(prop(var("a"), "x"), null()),
                vec![expr_stmt(call("g", vec![prop(var("a"), "x")]))],
                None,
            ),
            if_stmt(
                not_identical(prop(var("b"), "x"), null()),
                vec![echo(string("b is set"))],
                None,
            ),
            expr_stmt(call("g", vec![prop(var("b"), "x")])),
        ])
        .build();
    Program {
        classes: foo_bar_classes(),
        functions: vec![f, takes_bar()],
        statements: vec![expr_stmt(call(
            "f",
            vec![new_obj("Foo", vec![]), new_obj("Foo", vec![])],
        ))],
    }
}

#[test]
fn test_foo_bar_scenario_reports_only_b() {
    let result = check(&foo_bar_scenario());

    let nullable: Vec<_> = result
        .mismatches()
        .filter(|m| m.kind == MismatchKind::NullableArgument)
        .collect();
    assert_eq!(nullable.len(), 1);
    assert_eq!(nullable[0].expression, "$b->x");
    assert_eq!(result.diagnostics.len(), 1);
    assert!(!result.is_success());
    assert_eq!(
        result.diagnostics[0].message,
        "passed nullable Bar value as $v argument to g"
    );
}

#[test]
fn test_checking_is_idempotent() {
    let program = foo_bar_scenario();
    let first = check(&program);
    let second = check(&program);
    assert_eq!(first, second);
    assert_eq!(first.render_text(true), second.render_text(true));
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_handler_receives_every_diagnostic() {
    let handler = Arc::new(CollectingDiagnosticHandler::new());
    let checker = TypeChecker::with_builtins(handler.clone()).unwrap();
    let result = checker.check_program(&foo_bar_scenario());
    assert_eq!(handler.get_diagnostics(), result.diagnostics);
    assert_eq!(handler.error_count(), 1);
}

#[test]
fn test_failure_becomes_compilation_error() {
    match check(&foo_bar_scenario()).into_result() {
        Err(CompilationError::TypeErrors(count)) => assert_eq!(count, 1),
        other => panic!("expected type errors, got {:?}", other),
    }
    let clean = Program {
        functions: vec![takes_bar()],
        ..Default::default()
    };
    assert!(check(&clean).into_result().is_ok());
}

#[test]
fn test_structured_output() {
    let json = check(&foo_bar_scenario()).to_json().unwrap();
    let records: serde_json::Value = serde_json::from_str(&json).unwrap();
    let record = &records[0];
    assert_eq!(record["kind"], "NullableArgument");
    assert_eq!(record["level"], "error");
    assert_eq!(record["requiredType"], "Bar");
    assert_eq!(record["actualTypes"], serde_json::json!(["null"]));
    assert_eq!(record["expressionText"], "$b->x");
    assert!(record["location"]["line"].as_u64().unwrap() > 0);
}

#[test]
fn test_rendered_text_carries_code_and_suggestion() {
    let text = check(&foo_bar_scenario()).render_text(false);
    assert!(text.contains("E3102"), "{}", text);
    assert!(text.contains("$b->x !== null"), "{}", text);
}

#[test]
fn test_units_check_in_parallel() {
    fn assert_sync<T: Send + Sync>() {}
    assert_sync::<TypeChecker<'static>>();

    let handler = Arc::new(CollectingDiagnosticHandler::new());
    let checker = TypeChecker::with_builtins(handler).unwrap();
    let checker = &checker;
    let programs: Vec<Program> = (0..4).map(|_| foo_bar_scenario()).collect();
    let counts: Vec<usize> = std::thread::scope(|scope| {
        let workers: Vec<_> = programs
            .iter()
            .map(|program| scope.spawn(move || checker.check_program(program).error_count()))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });
    assert_eq!(counts, vec![1, 1, 1, 1]);
}

#[test]
fn test_config_file_drives_options() {
    let yaml = r#"
checkerOptions:
  unreachableNarrowing: error
  extraPureFunctions: [touch]
"#;
    let config = CheckerConfig::from_yaml_str(yaml).unwrap();
    let f = function("f")
        .param("a", Some(Type::instance("Foo")))
        .body(vec![
            if_stmt(
                not_identical(prop(var("a"), "x"), null()),
                vec![
                    expr_stmt(call("touch", vec![])),
                    expr_stmt(call("g", vec![prop(var("a"), "x")])),
                ],
                None,
            ),
            if_stmt(identical(var("a"), null()), vec![], None),
        ])
        .build();
    let subject = program(foo_bar_classes(), vec![f, takes_bar(), opaque()]);

    let result = check_with(config.checker_options, &subject);
    assert_eq!(kinds(&result), vec![MismatchKind::UnreachableNarrowing]);
    assert_eq!(result.error_count(), 1);
}
