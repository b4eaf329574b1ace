//! Shared fixtures for the integration tests
//!
//! Programs are built with `ast::builder`; every test checks against the bundled built-in
//! signature table.

#![allow(dead_code)]

use smartcast_typechecker::ast::builder::*;
use smartcast_typechecker::ast::{ClassDecl, FunctionDecl, Program};
use smartcast_typechecker::{
    CheckerOptions, CollectingDiagnosticHandler, CompilationResult, MismatchKind, Type,
    TypeChecker,
};
use std::sync::Arc;

pub fn check(program: &Program) -> CompilationResult {
    check_with(CheckerOptions::default(), program)
}

pub fn check_with(options: CheckerOptions, program: &Program) -> CompilationResult {
    let handler = Arc::new(CollectingDiagnosticHandler::new());
    let checker = TypeChecker::with_builtins(handler)
        .expect("built-in signatures load")
        .with_options(options);
    checker.check_program(program)
}

pub fn kinds(result: &CompilationResult) -> Vec<MismatchKind> {
    result.mismatches().map(|m| m.kind).collect()
}

pub fn messages(result: &CompilationResult) -> Vec<String> {
    result.diagnostics.iter().map(|d| d.message.clone()).collect()
}

/// `class Foo { public ?Bar $x; }` and `class Bar {}`
pub fn foo_bar_classes() -> Vec<ClassDecl> {
    vec![
        class("Foo")
            .property("x", Some(Type::nullable(Type::instance("Bar"))))
            .build(),
        class("Bar").build(),
    ]
}

/// `function g(Bar $v) {}`
pub fn takes_bar() -> FunctionDecl {
    function("g").param("v", Some(Type::instance("Bar"))).build()
}

/// `function touch() {}`: unknown effects
pub fn opaque() -> FunctionDecl {
    function("touch").build()
}

pub fn program(classes: Vec<ClassDecl>, functions: Vec<FunctionDecl>) -> Program {
    Program {
        classes,
        functions,
        statements: Vec::new(),
    }
}
