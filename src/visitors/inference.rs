use crate::ast::{BinaryOp, Closure, Expression, ExpressionKind, UnaryOp};
use crate::cfg::Instruction;
use crate::core::context::CheckContext;
use crate::core::type_compat::{Assumption, TypeCompatibility};
use crate::core::type_environment::TypeEnvironment;
use crate::diagnostics::{MismatchContext, MismatchKind, TypeMismatch};
use crate::helpers::type_utilities::{arithmetic_result, literal_type, numeric_result};
use crate::stdlib::FunctionSignature;
use crate::types::template::SlotBindings;
use crate::types::{CallableType, ClassId, Type};
use crate::utils::symbol_table::Scope;
use crate::visitors::compatibility::{self, CallSite};
use crate::visitors::narrowing::{narrow_from_condition, FlowFact, Segment, TrackedExpr};
use tracing::trace;

/// Computes expression types against a flow fact, applying each expression's effects to it.
///
/// With `checking` set, every context that requires a type is validated and violations are
/// collected; otherwise the evaluator only computes types and effects.
pub struct ExpressionEvaluator<'c, 'a> {
    ctx: &'c CheckContext<'a>,
    scope: &'c Scope,
    checking: bool,
    mismatches: Vec<TypeMismatch>,
    returns: Vec<Type>,
}

impl<'c, 'a> ExpressionEvaluator<'c, 'a> {
    pub fn new(ctx: &'c CheckContext<'a>, scope: &'c Scope, checking: bool) -> Self {
        Self {
            ctx,
            scope,
            checking,
            mismatches: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn env(&self) -> &'a TypeEnvironment {
        self.ctx.env
    }

    pub fn max_condition_depth(&self) -> usize {
        self.ctx.options.max_condition_depth
    }

    /// Violations and `return` operand types seen so far
    pub fn finish(self) -> (Vec<TypeMismatch>, Vec<Type>) {
        (self.mismatches, self.returns)
    }

    pub fn report_unreachable_narrowing(
        &mut self,
        condition: &Expression,
        expr: &TrackedExpr,
        current: &Type,
    ) {
        if !self.checking {
            return;
        }
        self.mismatches.push(TypeMismatch {
            kind: MismatchKind::UnreachableNarrowing,
            span: condition.span,
            expression: expr.to_string(),
            required: Type::Never,
            actual: vec![current.clone()],
            context: MismatchContext::Unreachable,
        });
    }

    /// The type `tracked` has under `fact`, falling back to declarations along its path.
    pub fn current_type(&self, tracked: &TrackedExpr, fact: &FlowFact) -> Type {
        if let Some(ty) = fact.get(tracked) {
            return ty.clone();
        }
        let Some(prefix) = tracked.prefix() else {
            return self.scope.declared_type(&tracked.root);
        };
        let base = self.current_type(&prefix, fact);
        match tracked.last_segment() {
            Some(Segment::Property(name)) => self.env().property_type(&base, name),
            Some(Segment::Key(_)) => base.element_type(),
            None => base,
        }
    }

    pub fn execute(&mut self, instruction: &Instruction<'_>, fact: &mut FlowFact) {
        match instruction {
            Instruction::Eval(expr) => {
                self.eval(expr, fact);
            }
            Instruction::Return(value) => {
                let ty = match value {
                    Some(expr) => self.eval(expr, fact),
                    None => Type::Null,
                };
                self.returns.push(ty);
            }
            Instruction::ForeachBind {
                subject,
                key,
                value,
                ..
            } => {
                let subject_ty = self.peek(subject, fact);
                if let Some(key) = key {
                    let key_ty = if subject_ty
                        .members()
                        .iter()
                        .any(|m| matches!(m, Type::Array(_)))
                    {
                        Type::union([Type::Int, Type::String])
                    } else {
                        Type::Mixed
                    };
                    self.assign_to(key, key_ty, fact);
                }
                self.assign_to(value, subject_ty.element_type(), fact);
            }
            Instruction::WriteBack { subject, value } => {
                let written = self.peek(value, fact);
                self.store_element(subject, &written, fact);
                self.forget_elements(subject, fact);
            }
            Instruction::BindCatch { var, classes } => {
                if let Some(var) = var {
                    let caught = Type::union(classes.iter().map(|c| Type::instance(c.clone())));
                    fact.assign_var(var, caught);
                }
            }
        }
    }

    /// Type of `expr` without touching `fact` or reporting anything
    pub fn peek(&self, expr: &Expression, fact: &FlowFact) -> Type {
        let mut quiet = ExpressionEvaluator::new(self.ctx, self.scope, false);
        let mut scratch = fact.clone();
        quiet.eval(expr, &mut scratch)
    }

    pub fn eval(&mut self, expr: &Expression, fact: &mut FlowFact) -> Type {
        if let Some(metrics) = self.ctx.metrics() {
            metrics.record_expression();
        }

        match &expr.kind {
            ExpressionKind::Literal(literal) => literal_type(literal),

            ExpressionKind::Variable(name) => {
                self.current_type(&TrackedExpr::variable(name.clone()), fact)
            }

            ExpressionKind::Property(object, name) => {
                let object_ty = self.eval(object, fact);
                if let Some(ty) = TrackedExpr::from_expr(expr).and_then(|t| fact.get(&t).cloned()) {
                    return ty;
                }
                self.env().property_type(&object_ty, name)
            }

            ExpressionKind::Index(base, key) => {
                let base_ty = self.eval(base, fact);
                let Some(key) = key else {
                    // `$xs[]` is only meaningful as an assignment target
                    return Type::Mixed;
                };
                let key_ty = self.eval(key, fact);
                if self.checking {
                    self.mismatches
                        .extend(compatibility::check_index_key(&base_ty, &key_ty, key, expr));
                }
                if let Some(ty) = TrackedExpr::from_expr(expr).and_then(|t| fact.get(&t).cloned()) {
                    return ty;
                }
                base_ty.element_type()
            }

            ExpressionKind::Call(name, args) => self.eval_call(name, args, fact),

            ExpressionKind::MethodCall(receiver, name, args) => {
                self.eval_method_call(receiver, name, args, fact)
            }

            ExpressionKind::New(class, args) => self.eval_new(class, args, fact),

            ExpressionKind::Array(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(key) = &item.key {
                        let key_ty = self.eval(key, fact);
                        if self.checking {
                            self.mismatches.extend(compatibility::check_index_key(
                                &Type::array(Type::Mixed),
                                &key_ty,
                                key,
                                expr,
                            ));
                        }
                    }
                    elements.push(self.eval(&item.value, fact));
                }
                Type::array(Type::union(elements))
            }

            ExpressionKind::Closure(closure) => Type::Callable(self.closure_type(closure)),

            ExpressionKind::Binary(BinaryOp::And | BinaryOp::Or, _, _) => {
                let (on_true, on_false) = narrow_from_condition(self, expr, fact.clone(), 0);
                if let Some(joined) = FlowFact::join_options(on_true, on_false) {
                    *fact = joined;
                }
                Type::Bool
            }

            ExpressionKind::Binary(BinaryOp::Coalesce, left, right) => {
                let left_ty = self.eval(left, fact);
                let mut right_fact = fact.clone();
                let right_ty = self.eval(right, &mut right_fact);
                *fact = fact.join(&right_fact);
                Type::union([left_ty.without_null(), right_ty])
            }

            ExpressionKind::Binary(op, left, right) => {
                let left_ty = self.eval(left, fact);
                let right_ty = self.eval(right, fact);
                match op {
                    BinaryOp::Concat => Type::String,
                    BinaryOp::Add
                    | BinaryOp::Sub
                    | BinaryOp::Mul
                    | BinaryOp::Div
                    | BinaryOp::Mod
                    | BinaryOp::Pow => arithmetic_result(*op, &left_ty, &right_ty),
                    _ => Type::Bool,
                }
            }

            ExpressionKind::Unary(op, operand) => {
                let operand_ty = self.eval(operand, fact);
                match op {
                    UnaryOp::Not => Type::Bool,
                    UnaryOp::Neg | UnaryOp::Plus => numeric_result(&operand_ty),
                    UnaryOp::PreIncrement | UnaryOp::PreDecrement => {
                        let updated = numeric_result(&operand_ty);
                        self.store(operand, updated.clone(), fact);
                        updated
                    }
                    UnaryOp::PostIncrement | UnaryOp::PostDecrement => {
                        self.store(operand, numeric_result(&operand_ty), fact);
                        operand_ty
                    }
                }
            }

            ExpressionKind::Assign(target, value) => {
                let value_ty = self.eval(value, fact);
                self.assign_to(target, value_ty.clone(), fact);
                value_ty
            }

            ExpressionKind::Ternary(condition, then, otherwise) => {
                self.eval_ternary(condition, then.as_deref(), otherwise, fact)
            }

            ExpressionKind::Instanceof(operand, _) => {
                self.eval(operand, fact);
                Type::Bool
            }
        }
    }

    fn eval_ternary(
        &mut self,
        condition: &Expression,
        then: Option<&Expression>,
        otherwise: &Expression,
        fact: &mut FlowFact,
    ) -> Type {
        let mut arms: Vec<(Type, FlowFact)> = Vec::with_capacity(2);
        let otherwise_fact = match then {
            Some(then) => {
                let (on_true, on_false) = narrow_from_condition(self, condition, fact.clone(), 0);
                if let Some(mut then_fact) = on_true {
                    let ty = self.eval(then, &mut then_fact);
                    arms.push((ty, then_fact));
                }
                on_false
            }
            None => {
                // `a ?: b` yields `a` itself when it is truthy
                let condition_ty = self.eval(condition, fact);
                let mut truthy_fact = fact.clone();
                let mut falsy_fact = fact.clone();
                if let Some(tracked) = TrackedExpr::from_expr(condition) {
                    let current = self.current_type(&tracked, fact);
                    truthy_fact.refine(
                        tracked.clone(),
                        TypeCompatibility::narrow(&current, &Assumption::Truthy, self.env()),
                    );
                    falsy_fact.refine(
                        tracked,
                        TypeCompatibility::narrow(&current, &Assumption::Falsy, self.env()),
                    );
                }
                let truthy =
                    TypeCompatibility::narrow(&condition_ty, &Assumption::Truthy, self.env());
                arms.push((truthy, truthy_fact));
                Some(falsy_fact)
            }
        };
        if let Some(mut otherwise_fact) = otherwise_fact {
            let ty = self.eval(otherwise, &mut otherwise_fact);
            arms.push((ty, otherwise_fact));
        }

        let mut result = Type::Never;
        let mut joined: Option<FlowFact> = None;
        for (ty, arm_fact) in arms {
            result = result.join(&ty);
            joined = FlowFact::join_options(joined, Some(arm_fact));
        }
        if let Some(joined) = joined {
            *fact = joined;
        }
        result
    }

    fn eval_args(&mut self, args: &[Expression], fact: &mut FlowFact) -> Vec<Type> {
        args.iter().map(|arg| self.eval(arg, fact)).collect()
    }

    fn eval_call(&mut self, name: &str, args: &[Expression], fact: &mut FlowFact) -> Type {
        let arg_types = self.eval_args(args, fact);
        let Some(signature) = self.ctx.resolve_function(name) else {
            trace!(function = name, "call to unknown function");
            self.apply_call_effects(None, false, args, fact);
            return Type::Mixed;
        };
        let result = self.complete_call(name, signature, args, &arg_types);
        let pure = self.ctx.policy.is_pure(name);
        self.apply_call_effects(Some(signature), pure, args, fact);
        result
    }

    fn eval_method_call(
        &mut self,
        receiver: &Expression,
        name: &str,
        args: &[Expression],
        fact: &mut FlowFact,
    ) -> Type {
        let receiver_ty = self.eval(receiver, fact);
        let arg_types = self.eval_args(args, fact);

        let mut results = Vec::new();
        let mut pure = true;
        let mut by_ref_source: Option<&FunctionSignature> = None;
        for member in receiver_ty.members() {
            let Type::Instance(class) = member else {
                if !matches!(member, Type::Null | Type::Never) {
                    results.push(Type::Mixed);
                    pure = false;
                }
                continue;
            };
            match self.env().method(class, name) {
                Some(signature) => {
                    let display = format!("{}::{}", class, signature.name);
                    results.push(self.complete_call(&display, signature, args, &arg_types));
                    pure &= signature.pure;
                    by_ref_source.get_or_insert(signature);
                }
                None => {
                    results.push(Type::Mixed);
                    pure = false;
                }
            }
        }
        self.apply_call_effects(by_ref_source, pure, args, fact);
        if results.is_empty() {
            return Type::Mixed;
        }
        Type::union(results)
    }

    fn eval_new(&mut self, class: &str, args: &[Expression], fact: &mut FlowFact) -> Type {
        let arg_types = self.eval_args(args, fact);
        let id = ClassId::new(class);
        if let Some(constructor) = self.env().method(&id, "__construct") {
            let display = format!("{}::__construct", class);
            self.complete_call(&display, constructor, args, &arg_types);
            self.apply_call_effects(Some(constructor), constructor.pure, args, fact);
        }
        Type::Instance(id)
    }

    /// Checks the arguments (when checking) and computes the call's result type.
    fn complete_call(
        &mut self,
        display: &str,
        signature: &FunctionSignature,
        args: &[Expression],
        arg_types: &[Type],
    ) -> Type {
        let callables: Vec<Option<CallableType>> = args
            .iter()
            .zip(arg_types)
            .enumerate()
            .map(|(index, (arg, ty))| {
                let wants_callable = signature
                    .param_for(index)
                    .map_or(false, |p| p.template.is_callable());
                if wants_callable {
                    self.resolve_callable(arg, ty)
                } else {
                    None
                }
            })
            .collect();

        let site = CallSite {
            function: display,
            signature,
            args,
            arg_types,
            callables: &callables,
        };
        if self.checking {
            self.mismatches
                .extend(compatibility::check_call(&site, self.env()));
        }

        match &signature.returns {
            Some(template) => {
                let callable_returns = site.callable_returns();
                template.instantiate(&SlotBindings::new(arg_types, &callable_returns))
            }
            None => self.ctx.infer_return(signature),
        }
    }

    /// The signature of a value passed where a callable is expected, if it can be determined:
    /// a string literal naming a function, or a value whose type is a single callable.
    fn resolve_callable(&self, arg: &Expression, ty: &Type) -> Option<CallableType> {
        if let Some(name) = arg.as_string_literal() {
            let signature = self.ctx.resolve_function(name)?;
            return Some(signature.as_callable(self.ctx.return_type(signature)));
        }
        match ty {
            Type::Callable(callable) => Some(callable.clone()),
            _ => None,
        }
    }

    fn closure_type(&self, closure: &Closure) -> CallableType {
        let params = closure.params.iter().map(|p| p.declared_type()).collect();
        let returns = match &closure.return_type {
            Some(ty) => ty.clone(),
            None => self
                .ctx
                .infer_closure_return(closure, self.scope.receiver()),
        };
        CallableType::new(params, returns)
    }

    /// An impure call may mutate any object; by-reference arguments may be rebound.
    fn apply_call_effects(
        &mut self,
        signature: Option<&FunctionSignature>,
        pure: bool,
        args: &[Expression],
        fact: &mut FlowFact,
    ) {
        if !pure && fact.invalidate_chains() > 0 {
            if let Some(metrics) = self.ctx.metrics() {
                metrics.record_chain_invalidation();
            }
        }
        let Some(signature) = signature else {
            return;
        };
        for (index, arg) in args.iter().enumerate() {
            let by_ref = signature.param_for(index).map_or(false, |p| p.by_ref);
            if !by_ref {
                continue;
            }
            if let Some(tracked) = TrackedExpr::from_expr(arg) {
                fact.forget(&tracked);
            }
        }
    }

    /// Evaluates the target's own subexpressions, checks the store and records it.
    fn assign_to(&mut self, target: &Expression, value: Type, fact: &mut FlowFact) {
        match &target.kind {
            ExpressionKind::Property(object, name) => {
                let object_ty = self.eval(object, fact);
                if self.checking {
                    self.mismatches.extend(compatibility::check_property_assignment(
                        self.env(),
                        &object_ty,
                        target,
                        name,
                        &value,
                    ));
                }
            }
            ExpressionKind::Index(base, key) => {
                let key_ty = key.as_ref().map(|k| (k, self.eval(k, fact)));
                let base_ty = self.eval(base, fact);
                if let (true, Some((key, key_ty))) = (self.checking, key_ty) {
                    self.mismatches.extend(compatibility::check_index_key(
                        &base_ty, &key_ty, key, target,
                    ));
                }
            }
            _ => {}
        }
        self.store(target, value, fact);
    }

    /// Records that `target` now holds a value of type `value`.
    fn store(&mut self, target: &Expression, value: Type, fact: &mut FlowFact) {
        match &target.kind {
            ExpressionKind::Variable(name) => fact.assign_var(name, value),
            ExpressionKind::Property(_, name) => match TrackedExpr::from_expr(target) {
                Some(tracked) => fact.assign_chain(tracked, value),
                None => {
                    fact.invalidate_segment(&Segment::Property(name.clone()), None);
                }
            },
            ExpressionKind::Index(base, key) => {
                self.store_element(base, &value, fact);
                match TrackedExpr::from_expr(target) {
                    Some(tracked) => fact.set(tracked, value),
                    // `$xs[$k] = ...` may overwrite any slot.
                    None if key.is_some() => self.forget_elements(base, fact),
                    None => {}
                }
            }
            _ => {}
        }
    }

    /// Widens the container `base` to also hold `value` elements.
    fn store_element(&mut self, base: &Expression, value: &Type, fact: &mut FlowFact) {
        let container = match TrackedExpr::from_expr(base) {
            Some(tracked) => self.current_type(&tracked, fact),
            None => Type::Mixed,
        };
        let updated = with_element(&container, value);
        if updated != container {
            self.store(base, updated, fact);
        }
    }

    /// Drops facts about the slots of `base`, or of its nearest tracked container when
    /// `base` itself is not trackable.
    fn forget_elements(&mut self, base: &Expression, fact: &mut FlowFact) {
        let mut current = base;
        loop {
            if let Some(tracked) = TrackedExpr::from_expr(current) {
                let dropped = fact.forget_members(&tracked);
                if dropped > 0 {
                    if let Some(metrics) = self.ctx.metrics() {
                        metrics.record_chain_invalidation();
                    }
                }
                return;
            }
            match &current.kind {
                ExpressionKind::Index(inner, _) | ExpressionKind::Property(inner, _) => {
                    current = &**inner;
                }
                _ => return,
            }
        }
    }
}

/// Container type after storing a `value` element into `container`.
fn with_element(container: &Type, value: &Type) -> Type {
    if container.is_mixed() {
        return Type::Mixed;
    }
    Type::union(container.members().iter().map(|member| match member {
        Type::Array(element) => Type::array(element.join(value)),
        Type::Null | Type::Never => Type::array(value.clone()),
        other => other.clone(),
    }))
}
