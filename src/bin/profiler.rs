use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use smartcast_typechecker::ast::builder::*;
use smartcast_typechecker::ast::{Program, Statement};
use smartcast_typechecker::{CollectingDiagnosticHandler, Metrics, Type, TypeChecker};

const PHASES: [&str; 3] = ["cfg", "narrowing", "checking"];

fn base_program() -> Program {
    Program {
        classes: vec![
            class("Foo")
                .property("x", Some(Type::nullable(Type::instance("Bar"))))
                .build(),
            class("Bar").build(),
        ],
        functions: vec![
            function("g").param("v", Some(Type::instance("Bar"))).build(),
            function("touch").build(),
        ],
        statements: Vec::new(),
    }
}

/// Functions that guard a nullable property chain, call something opaque, then use it
fn guarded_chains(count: usize) -> Program {
    let mut program = base_program();
    for i in 0..count {
        program.functions.push(
            function(&format!("chain{}", i))
                .param("a", Some(Type::instance("Foo")))
                .body(vec![
                    if_stmt(
                        identical(prop(var("a"), "x"), null()),
                        vec![ret(None)],
                        None,
                    ),
                    expr_stmt(call("g", vec![prop(var("a"), "x")])),
                    expr_stmt(call("touch", vec![])),
                    expr_stmt(call("g", vec![prop(var("a"), "x")])),
                ])
                .build(),
        );
    }
    program
}

/// Loops nested `depth` deep around a reassigned nullable variable
fn nested_loops(depth: usize) -> Program {
    let mut program = base_program();
    let mut body: Vec<Statement> = vec![
        expr_stmt(call("g", vec![var("x")])),
        expr_stmt(assign(var("x"), null())),
    ];
    for _ in 0..depth {
        body = vec![while_stmt(not_identical(var("x"), null()), body)];
    }
    program.functions.push(
        function("loops")
            .param("x", Some(Type::nullable(Type::instance("Bar"))))
            .body(body)
            .build(),
    );
    program
}

/// Top-level statements sorting and mapping through callbacks
fn callbacks(count: usize) -> Program {
    let mut program = base_program();
    for i in 0..count {
        let xs = format!("xs{}", i);
        program.statements.push(expr_stmt(assign(
            var(&xs),
            array(vec![int(3), int(1), int(2)]),
        )));
        program.statements.push(expr_stmt(call(
            "usort",
            vec![
                var(&xs),
                closure(
                    vec![param("a", Some(Type::Int)), param("b", Some(Type::Int))],
                    Some(Type::Int),
                    vec![ret(Some(int(0)))],
                ),
            ],
        )));
    }
    program
}

fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{}.{:02}ms", micros / 1000, (micros % 1000) / 10)
    } else {
        format!(
            "{}.{:02}s",
            micros / 1_000_000,
            (micros % 1_000_000) / 10000
        )
    }
}

fn profile(name: &str, program: &Program) {
    let metrics = Arc::new(Metrics::new());
    let handler = Arc::new(CollectingDiagnosticHandler::new());
    let checker = match TypeChecker::with_builtins(handler) {
        Ok(checker) => checker.with_metrics(metrics.clone()),
        Err(e) => {
            eprintln!("failed to load built-in signatures: {}", e);
            return;
        }
    };

    let start = Instant::now();
    let result = checker.check_program(program);
    let total = start.elapsed();

    println!("═══════════════════════════════════════════════════════════════");
    println!("{}", name);
    println!("═══════════════════════════════════════════════════════════════");
    println!("   Total: {}", format_duration(total));
    for phase in PHASES {
        let spent = metrics.phase_total(phase);
        let share = if total.is_zero() {
            0.0
        } else {
            spent.as_secs_f64() / total.as_secs_f64() * 100.0
        };
        println!(
            "   ├─ {:<10} {:>10} ({:4.1}%)",
            phase,
            format_duration(spent),
            share
        );
    }
    println!(
        "   └─ diagnostics: {} errors, {} warnings",
        result.error_count(),
        result.warning_count()
    );
    println!();
    println!("{}", metrics.get_summary().format());
    println!();
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let workloads: Vec<(&str, Program)> = vec![
        ("Guarded property chains (500 functions)", guarded_chains(500)),
        ("Nested loops (depth 12)", nested_loops(12)),
        ("Callbacks (300 usort calls)", callbacks(300)),
    ];

    for (name, program) in &workloads {
        profile(name, program);
    }
}
