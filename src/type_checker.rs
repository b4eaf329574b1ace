use crate::ast::{
    Closure, Expression, ExpressionKind, FunctionDecl, Program, Statement, StatementKind,
};
use crate::cfg::builder::CfgBuilder;
use crate::cli::config::CheckerOptions;
use crate::core::context::CheckContext;
use crate::core::type_environment::TypeEnvironment;
use crate::diagnostics::{CompilationResult, Diagnostic, DiagnosticHandler, DiagnosticReporter};
use crate::errors::SignatureError;
use crate::narrowing_engine::NarrowingEngine;
use crate::span::Span;
use crate::state::metrics::Metrics;
use crate::stdlib::{builtins, PurityPolicy, SignatureTable};
use crate::types::ClassId;
use crate::utils::symbol_table::Scope;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Flow-sensitive checker for a whole program.
///
/// Every function, method, closure and the top-level code is a separate unit; each is
/// lowered to a CFG, analysed to a fixed point and then checked once.
pub struct TypeChecker<'s> {
    diagnostic_handler: Arc<dyn DiagnosticHandler>,
    signatures: &'s SignatureTable,
    options: CheckerOptions,
    metrics: Option<Arc<Metrics>>,
}

/// One body to check, with what its scope is built from
enum Unit<'p> {
    Main(&'p [Statement]),
    Function(&'p FunctionDecl, Option<ClassId>),
    Closure(&'p Closure, Option<ClassId>, Span),
}

impl<'p> Unit<'p> {
    fn body(&self) -> &'p [Statement] {
        match self {
            Unit::Main(body) => *body,
            Unit::Function(decl, _) => &decl.body,
            Unit::Closure(closure, _, _) => &closure.body,
        }
    }

    fn scope(&self) -> Scope {
        match self {
            Unit::Main(_) => Scope::new(),
            Unit::Function(decl, receiver) => Scope::for_function(decl, receiver.as_ref()),
            Unit::Closure(closure, receiver, span) => {
                Scope::for_closure(closure, receiver.as_ref(), *span)
            }
        }
    }

    fn name(&self) -> String {
        match self {
            Unit::Main(_) => "{main}".to_string(),
            Unit::Function(decl, Some(class)) => format!("{}::{}", class, decl.name),
            Unit::Function(decl, None) => decl.name.clone(),
            Unit::Closure(_, _, span) => format!("{{closure@{}}}", span),
        }
    }
}

impl<'s> TypeChecker<'s> {
    pub fn new(diagnostic_handler: Arc<dyn DiagnosticHandler>, signatures: &'s SignatureTable) -> Self {
        Self {
            diagnostic_handler,
            signatures,
            options: CheckerOptions::default(),
            metrics: None,
        }
    }

    /// Checker over the bundled built-in signature table.
    pub fn with_builtins(
        diagnostic_handler: Arc<dyn DiagnosticHandler>,
    ) -> Result<TypeChecker<'static>, SignatureError> {
        Ok(TypeChecker::new(diagnostic_handler, builtins()?))
    }

    pub fn with_options(mut self, options: CheckerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &CheckerOptions {
        &self.options
    }

    /// Checks every unit of `program`, reports each diagnostic to the handler and returns them.
    ///
    /// The program is only read; checking the same program twice gives the same result.
    #[instrument(skip_all, fields(functions = program.functions.len(), classes = program.classes.len()))]
    pub fn check_program(&self, program: &Program) -> CompilationResult {
        let env = TypeEnvironment::from_program(program);
        let policy = PurityPolicy::new(
            self.signatures,
            program.functions.iter(),
            &self.options.extra_pure_functions,
        );
        let mut ctx = CheckContext::new(program, &env, self.signatures, &policy, &self.options);
        if let Some(metrics) = self.metrics.as_deref() {
            ctx = ctx.with_metrics(metrics);
        }
        let reporter = DiagnosticReporter::new(&self.options);

        let units = collect_units(program);
        info!(units = units.len(), "checking program");

        let mut diagnostics = Vec::new();
        for unit in &units {
            diagnostics.extend(self.check_unit(&ctx, &reporter, unit));
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_diagnostics(diagnostics.len());
        }
        for diagnostic in &diagnostics {
            self.diagnostic_handler.report(diagnostic.clone());
        }
        info!(diagnostics = diagnostics.len(), "program checked");
        CompilationResult::new(diagnostics)
    }

    fn check_unit(
        &self,
        ctx: &CheckContext<'_>,
        reporter: &DiagnosticReporter,
        unit: &Unit<'_>,
    ) -> Vec<Diagnostic> {
        let scope = unit.scope();

        let started = Instant::now();
        let cfg = CfgBuilder::new().build(unit.body());
        self.record_phase("cfg", started);

        let engine = NarrowingEngine::new(ctx, &scope);
        let started = Instant::now();
        let analysis = engine.run(&cfg);
        self.record_phase("narrowing", started);

        let started = Instant::now();
        let outcome = engine.replay(&cfg, &analysis, true);
        self.record_phase("checking", started);

        if let Some(metrics) = &self.metrics {
            metrics.record_unit();
            metrics.record_blocks(cfg.len());
            metrics.record_fixpoint(analysis.iterations, analysis.converged);
        }
        debug!(
            unit = %unit.name(),
            blocks = cfg.len(),
            iterations = analysis.iterations,
            mismatches = outcome.mismatches.len(),
            "unit checked"
        );
        reporter.report_unit(outcome.mismatches)
    }

    fn record_phase(&self, phase: &'static str, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_phase_time(phase, started.elapsed());
        }
    }
}

/// Functions, then methods, then every closure, then the top-level code
fn collect_units(program: &Program) -> Vec<Unit<'_>> {
    let mut units = Vec::new();
    for decl in &program.functions {
        units.push(Unit::Function(decl, None));
    }
    for class in &program.classes {
        let receiver = ClassId::new(class.name.clone());
        for method in &class.methods {
            units.push(Unit::Function(method, Some(receiver.clone())));
        }
    }

    let mut closures = Vec::new();
    for decl in &program.functions {
        collect_closures_in_block(&decl.body, None, &mut closures);
    }
    for class in &program.classes {
        let receiver = ClassId::new(class.name.clone());
        for method in &class.methods {
            collect_closures_in_block(&method.body, Some(&receiver), &mut closures);
        }
    }
    collect_closures_in_block(&program.statements, None, &mut closures);
    units.extend(closures);

    units.push(Unit::Main(&program.statements));
    units
}

fn collect_closures_in_block<'p>(
    statements: &'p [Statement],
    receiver: Option<&ClassId>,
    out: &mut Vec<Unit<'p>>,
) {
    for statement in statements {
        collect_closures_in_statement(statement, receiver, out);
    }
}

fn collect_closures_in_statement<'p>(
    statement: &'p Statement,
    receiver: Option<&ClassId>,
    out: &mut Vec<Unit<'p>>,
) {
    let visit = |expr: &'p Expression, out: &mut Vec<Unit<'p>>| {
        collect_closures_in_expression(expr, receiver, out)
    };
    match &statement.kind {
        StatementKind::Expression(expr) | StatementKind::Throw(expr) => visit(expr, out),
        StatementKind::Echo(exprs) => exprs.iter().for_each(|e| visit(e, out)),
        StatementKind::Return(value) => {
            if let Some(value) = value {
                visit(value, out);
            }
        }
        StatementKind::If {
            condition,
            then_block,
            else_block,
        } => {
            visit(condition, out);
            collect_closures_in_block(then_block, receiver, out);
            if let Some(else_block) = else_block {
                collect_closures_in_block(else_block, receiver, out);
            }
        }
        StatementKind::While { condition, body } | StatementKind::DoWhile { body, condition } => {
            visit(condition, out);
            collect_closures_in_block(body, receiver, out);
        }
        StatementKind::For {
            init,
            condition,
            update,
            body,
        } => {
            init.iter().chain(condition).chain(update).for_each(|e| visit(e, out));
            collect_closures_in_block(body, receiver, out);
        }
        StatementKind::Foreach {
            subject,
            key,
            value,
            body,
            ..
        } => {
            visit(subject, out);
            if let Some(key) = key {
                visit(key, out);
            }
            visit(value, out);
            collect_closures_in_block(body, receiver, out);
        }
        StatementKind::Try {
            body,
            catches,
            finally,
        } => {
            collect_closures_in_block(body, receiver, out);
            for clause in catches {
                collect_closures_in_block(&clause.body, receiver, out);
            }
            if let Some(finally) = finally {
                collect_closures_in_block(finally, receiver, out);
            }
        }
        StatementKind::Block(statements) => collect_closures_in_block(statements, receiver, out),
        StatementKind::Break | StatementKind::Continue => {}
    }
}

fn collect_closures_in_expression<'p>(
    expr: &'p Expression,
    receiver: Option<&ClassId>,
    out: &mut Vec<Unit<'p>>,
) {
    let visit = |e: &'p Expression, out: &mut Vec<Unit<'p>>| {
        collect_closures_in_expression(e, receiver, out)
    };
    match &expr.kind {
        ExpressionKind::Literal(_) | ExpressionKind::Variable(_) => {}
        ExpressionKind::Property(object, _) => visit(object, out),
        ExpressionKind::Index(base, key) => {
            visit(base, out);
            if let Some(key) = key {
                visit(key, out);
            }
        }
        ExpressionKind::Call(_, args) | ExpressionKind::New(_, args) => {
            args.iter().for_each(|a| visit(a, out))
        }
        ExpressionKind::MethodCall(receiver_expr, _, args) => {
            visit(receiver_expr, out);
            args.iter().for_each(|a| visit(a, out));
        }
        ExpressionKind::Array(items) => {
            for item in items {
                if let Some(key) = &item.key {
                    visit(key, out);
                }
                visit(&item.value, out);
            }
        }
        ExpressionKind::Closure(closure) => {
            out.push(Unit::Closure(closure, receiver.cloned(), expr.span));
            collect_closures_in_block(&closure.body, receiver, out);
        }
        ExpressionKind::Binary(_, left, right) | ExpressionKind::Assign(left, right) => {
            visit(left, out);
            visit(right, out);
        }
        ExpressionKind::Unary(_, operand) | ExpressionKind::Instanceof(operand, _) => {
            visit(operand, out)
        }
        ExpressionKind::Ternary(condition, then, otherwise) => {
            visit(condition, out);
            if let Some(then) = then {
                visit(then, out);
            }
            visit(otherwise, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;
    use crate::diagnostics::{CollectingDiagnosticHandler, MismatchKind};
    use crate::types::Type;

    fn checker(handler: Arc<CollectingDiagnosticHandler>) -> TypeChecker<'static> {
        TypeChecker::with_builtins(handler).unwrap()
    }

    #[test]
    fn test_units_in_order() {
        let program = Program {
            classes: vec![class("Greeter")
                .method(function("greet").body(vec![expr_stmt(closure(
                    vec![],
                    None,
                    vec![ret(Some(this()))],
                ))]).build())
                .build()],
            functions: vec![function("helper").build()],
            statements: vec![echo(int(1))],
        };
        let names: Vec<String> = collect_units(&program).iter().map(|u| u.name()).collect();
        assert_eq!(names.len(), 4);
        assert_eq!(names[0], "helper");
        assert_eq!(names[1], "Greeter::greet");
        assert!(names[2].starts_with("{closure@"));
        assert_eq!(names[3], "{main}");
    }

    #[test]
    fn test_reports_to_handler() {
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        let program = Program {
            statements: vec![
                expr_stmt(assign(var("s"), string("abc"))),
                echo(index(var("s"), bool_lit(true))),
            ],
            ..Default::default()
        };
        let result = checker(handler.clone()).check_program(&program);
        assert_eq!(result.error_count(), 1);
        assert_eq!(handler.get_diagnostics().len(), 1);
        let kinds: Vec<_> = result.mismatches().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MismatchKind::IndexKey]);
    }

    #[test]
    fn test_closure_body_is_checked() {
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        let program = Program {
            statements: vec![expr_stmt(assign(
                var("f"),
                closure(
                    vec![param("n", Some(Type::union([Type::Int, Type::Null])))],
                    None,
                    vec![ret(Some(call("abs", vec![var("n")])))],
                ),
            ))],
            ..Default::default()
        };
        let result = checker(handler).check_program(&program);
        let kinds: Vec<_> = result.mismatches().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MismatchKind::NullableArgument]);
    }

    #[test]
    fn test_metrics_are_recorded() {
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        let metrics = Arc::new(Metrics::new());
        let program = Program {
            functions: vec![function("f").body(vec![ret(Some(int(1)))]).build()],
            statements: vec![echo(call("f", vec![]))],
            ..Default::default()
        };
        checker(handler)
            .with_metrics(metrics.clone())
            .check_program(&program);
        let summary = metrics.get_summary();
        assert_eq!(summary.units_checked, 2);
        assert!(summary.blocks_built >= 2);
        assert_eq!(summary.fixpoint_bailouts, 0);
    }
}
