use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use smartcast_typechecker::ast::builder::*;
use smartcast_typechecker::ast::{BinaryOp, Program, Statement};
use smartcast_typechecker::{CollectingDiagnosticHandler, Type, TypeChecker};

fn check(program: &Program) {
    let handler = Arc::new(CollectingDiagnosticHandler::new());
    let checker = TypeChecker::with_builtins(handler).expect("built-in signatures load");
    black_box(checker.check_program(program));
}

fn nullable_bar() -> Option<Type> {
    Some(Type::nullable(Type::instance("Bar")))
}

fn base_program() -> Program {
    Program {
        classes: vec![
            class("Foo")
                .property("x", Some(Type::nullable(Type::instance("Bar"))))
                .build(),
            class("Bar").build(),
        ],
        functions: vec![function("g").param("v", Some(Type::instance("Bar"))).build()],
        statements: Vec::new(),
    }
}

/// `count` functions, each checking and using one nullable parameter
fn generate_null_checks(count: usize) -> Program {
    let mut program = base_program();
    for i in 0..count {
        program.functions.push(
            function(&format!("f{}", i))
                .param("x", nullable_bar())
                .body(vec![
                    if_stmt(identical(var("x"), null()), vec![ret(None)], None),
                    expr_stmt(call("g", vec![var("x")])),
                ])
                .build(),
        );
    }
    program
}

/// One function with `count` property chains, each narrowed then used
fn generate_chains(count: usize) -> Program {
    let mut program = base_program();
    let mut f = function("chains");
    let mut body = Vec::new();
    for i in 0..count {
        let name = format!("o{}", i);
        f = f.param(&name, Some(Type::instance("Foo")));
        body.push(if_stmt(
            not_identical(prop(var(&name), "x"), null()),
            vec![expr_stmt(call("g", vec![prop(var(&name), "x")]))],
            None,
        ));
    }
    program.functions.push(f.body(body).build());
    program
}

/// Loops nested `depth` deep, each reassigning the same nullable variable
fn generate_nested_loops(depth: usize) -> Program {
    let mut program = base_program();
    let mut body: Vec<Statement> = vec![
        expr_stmt(call("g", vec![var("x")])),
        expr_stmt(assign(var("x"), null())),
    ];
    for i in 0..depth {
        body = vec![
            expr_stmt(assign(var(&format!("i{}", i)), int(0))),
            while_stmt(not_identical(var("x"), null()), body),
        ];
    }
    program
        .functions
        .push(function("loops").param("x", nullable_bar()).body(body).build());
    program
}

/// `count` closures passed through `array_map`
fn generate_callbacks(count: usize) -> Program {
    let mut program = base_program();
    for i in 0..count {
        program.statements.push(expr_stmt(assign(
            var(&format!("r{}", i)),
            call(
                "array_map",
                vec![
                    closure(
                        vec![param("n", Some(Type::Int))],
                        None,
                        vec![ret(Some(binary(BinaryOp::Mul, var("n"), int(2))))],
                    ),
                    array(vec![int(1), int(2), int(3)]),
                ],
            ),
        )));
    }
    program
}

/// A condition of `width` null checks joined by `&&`
fn generate_wide_condition(width: usize) -> Program {
    let mut program = base_program();
    let mut f = function("wide");
    let mut condition = not_identical(var("p0"), null());
    f = f.param("p0", nullable_bar());
    for i in 1..width {
        let name = format!("p{}", i);
        f = f.param(&name, nullable_bar());
        condition = and(condition, not_identical(var(&name), null()));
    }
    let uses = (0..width)
        .map(|i| expr_stmt(call("g", vec![var(&format!("p{}", i))])))
        .collect();
    program
        .functions
        .push(f.body(vec![if_stmt(condition, uses, None)]).build());
    program
}

fn benchmark_null_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("null_checks");

    for count in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("functions", count), &count, |b, &count| {
            let program = generate_null_checks(count);
            b.iter(|| check(black_box(&program)))
        });
    }

    group.finish();
}

fn benchmark_chains(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_chains");

    for count in [10, 50, 200] {
        group.bench_with_input(BenchmarkId::new("chains", count), &count, |b, &count| {
            let program = generate_chains(count);
            b.iter(|| check(black_box(&program)))
        });
    }

    group.finish();
}

fn benchmark_nested_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_loops");

    for depth in [2, 5, 10] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let program = generate_nested_loops(depth);
            b.iter(|| check(black_box(&program)))
        });
    }

    group.finish();
}

fn benchmark_callbacks(c: &mut Criterion) {
    let mut group = c.benchmark_group("callbacks");

    for count in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("closures", count), &count, |b, &count| {
            let program = generate_callbacks(count);
            b.iter(|| check(black_box(&program)))
        });
    }

    group.finish();
}

fn benchmark_wide_conditions(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_conditions");

    for width in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            let program = generate_wide_condition(width);
            b.iter(|| check(black_box(&program)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_null_checks,
    benchmark_chains,
    benchmark_nested_loops,
    benchmark_callbacks,
    benchmark_wide_conditions
);
criterion_main!(benches);
