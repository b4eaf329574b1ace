use crate::ast::{BinaryOp, Expression, ExpressionKind, Literal, UnaryOp};
use crate::core::type_compat::{Assumption, TypeCompatibility};
use crate::helpers::type_utilities::is_int_like;
use crate::types::{ClassId, Type, MAX_ARRAY_DEPTH};
use crate::utils::symbol_table::Scope;
use crate::visitors::inference::ExpressionEvaluator;
use rustc_hash::FxHashMap;
use std::fmt;

/// Literal array key inside a tracked chain; int-like string keys are stored as ints
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayKey {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Property(String),
    Key(ArrayKey),
}

/// Identity of a narrowable location: a variable, or an access chain rooted at one.
///
/// Two expressions are the same location iff their paths are structurally identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackedExpr {
    pub root: String,
    pub path: Vec<Segment>,
}

impl TrackedExpr {
    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            path: Vec::new(),
        }
    }

    pub fn from_expr(expr: &Expression) -> Option<Self> {
        match &expr.kind {
            ExpressionKind::Variable(name) => Some(Self::variable(name.clone())),
            ExpressionKind::Property(object, name) => {
                Some(Self::from_expr(object)?.child(Segment::Property(name.clone())))
            }
            ExpressionKind::Index(base, Some(key)) => {
                let key = match &key.kind {
                    ExpressionKind::Literal(Literal::Int(i)) => ArrayKey::Int(*i),
                    ExpressionKind::Literal(Literal::String(s)) => match s.parse::<i64>() {
                        Ok(i) if is_int_like(s) => ArrayKey::Int(i),
                        _ => ArrayKey::Str(s.clone()),
                    },
                    _ => return None,
                };
                Some(Self::from_expr(base)?.child(Segment::Key(key)))
            }
            _ => None,
        }
    }

    pub fn child(mut self, segment: Segment) -> Self {
        self.path.push(segment);
        self
    }

    pub fn is_chain(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn prefix(&self) -> Option<TrackedExpr> {
        if self.path.is_empty() {
            return None;
        }
        Some(TrackedExpr {
            root: self.root.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    pub fn last_segment(&self) -> Option<&Segment> {
        self.path.last()
    }

    /// True if `self` is `base` followed by at least one more segment
    pub fn extends(&self, base: &TrackedExpr) -> bool {
        self.root == base.root
            && self.path.len() > base.path.len()
            && self.path.starts_with(&base.path)
    }
}

impl fmt::Display for TrackedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.root)?;
        for segment in &self.path {
            match segment {
                Segment::Property(name) => write!(f, "->{}", name)?,
                Segment::Key(ArrayKey::Int(i)) => write!(f, "[{}]", i)?,
                Segment::Key(ArrayKey::Str(s)) => write!(f, "[\"{}\"]", s)?,
            }
        }
        Ok(())
    }
}

/// Narrowed types at one program point.
///
/// A location without an entry has its declared type: the scope's type for variables, the
/// declared property (or element) type of its prefix for chains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowFact {
    entries: FxHashMap<TrackedExpr, Type>,
}

impl FlowFact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry fact of a unit: every declared variable at its declared type
    pub fn seeded(scope: &Scope) -> Self {
        let mut fact = Self::new();
        for symbol in scope.symbols() {
            fact.entries
                .insert(TrackedExpr::variable(symbol.name.clone()), symbol.typ.clone());
        }
        fact
    }

    pub fn get(&self, expr: &TrackedExpr) -> Option<&Type> {
        self.entries.get(expr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a narrower type for the same value; facts about its members stay valid.
    pub fn refine(&mut self, expr: TrackedExpr, ty: Type) {
        self.entries.insert(expr, ty);
    }

    /// The location now holds a different value: drop facts about its members.
    pub fn set(&mut self, expr: TrackedExpr, ty: Type) {
        self.entries.retain(|key, _| !key.extends(&expr));
        self.entries.insert(expr, ty);
    }

    /// Back to the declared type, for the location and everything reached through it.
    pub fn forget(&mut self, expr: &TrackedExpr) {
        self.entries
            .retain(|key, _| key != expr && !key.extends(expr));
    }

    /// Drops facts reached through `base` but keeps the one about `base` itself.
    pub fn forget_members(&mut self, base: &TrackedExpr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.extends(base));
        before - self.entries.len()
    }

    /// `$name = ...`: chains through the old value no longer describe the new one.
    pub fn assign_var(&mut self, name: &str, ty: Type) {
        self.entries
            .retain(|key, _| key.root != name || !key.is_chain());
        self.entries.insert(TrackedExpr::variable(name), ty);
    }

    /// `$a->...->p = ...`: any other chain ending in or passing through `p` may alias it.
    pub fn assign_chain(&mut self, expr: TrackedExpr, ty: Type) {
        if let Some(segment) = expr.last_segment().cloned() {
            self.invalidate_segment(&segment, Some(&expr));
        }
        self.set(expr, ty);
    }

    /// Drops every chain containing `segment`, except `keep` itself.
    pub fn invalidate_segment(&mut self, segment: &Segment, keep: Option<&TrackedExpr>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            Some(key) == keep || !key.path.iter().any(|s| s == segment)
        });
        before - self.entries.len()
    }

    /// An opaque call may mutate any object: only plain variables keep their facts.
    pub fn invalidate_chains(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.is_chain());
        before - self.entries.len()
    }

    /// Merge at a control-flow join; a location missing on either side falls back to its
    /// declared type, so it is dropped.
    pub fn join(&self, other: &FlowFact) -> FlowFact {
        let mut entries = FxHashMap::default();
        for (key, ty) in &self.entries {
            if let Some(other_ty) = other.entries.get(key) {
                entries.insert(
                    key.clone(),
                    TypeCompatibility::join(ty, other_ty).widen(MAX_ARRAY_DEPTH),
                );
            }
        }
        FlowFact { entries }
    }

    /// Join where `None` is an edge that cannot be taken
    pub fn join_options(a: Option<FlowFact>, b: Option<FlowFact>) -> Option<FlowFact> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.join(&b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    /// Entries ordered by location, for logging and tests
    pub fn sorted_entries(&self) -> Vec<(&TrackedExpr, &Type)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// A narrowing check recognized in a branch condition
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionCheck {
    pub expr: TrackedExpr,
    pub on_true: Assumption,
    pub on_false: Assumption,
}

impl ConditionCheck {
    fn new(expr: TrackedExpr, on_true: Assumption, on_false: Assumption) -> Self {
        Self {
            expr,
            on_true,
            on_false,
        }
    }

    fn negated(self) -> Self {
        Self::new(self.expr, self.on_false, self.on_true)
    }
}

/// Extract a null comparison: `x === null`, `null !== x`, `x == null`, `x != null`
fn extract_null_check(op: BinaryOp, left: &Expression, right: &Expression) -> Option<ConditionCheck> {
    let operand = if right.is_null_literal() {
        left
    } else if left.is_null_literal() {
        right
    } else {
        return None;
    };
    let expr = tracked_operand(operand)?;
    // Loose equality with null also holds for false, 0, "" and []
    let check = match op {
        BinaryOp::Identical => ConditionCheck::new(expr, Assumption::IsNull, Assumption::NotNull),
        BinaryOp::NotIdentical => {
            ConditionCheck::new(expr, Assumption::NotNull, Assumption::IsNull)
        }
        BinaryOp::Equal => ConditionCheck::new(expr, Assumption::Falsy, Assumption::NotNull),
        BinaryOp::NotEqual => ConditionCheck::new(expr, Assumption::NotNull, Assumption::Falsy),
        _ => return None,
    };
    Some(check)
}

/// Extract a type guard call: `is_null(x)`
fn extract_type_guard_call(name: &str, args: &[Expression]) -> Option<ConditionCheck> {
    if !name.eq_ignore_ascii_case("is_null") || args.len() != 1 {
        return None;
    }
    let expr = tracked_operand(&args[0])?;
    Some(ConditionCheck::new(expr, Assumption::IsNull, Assumption::NotNull))
}

/// The location a condition operand tests; `($x = f())` tests `$x`.
fn tracked_operand(operand: &Expression) -> Option<TrackedExpr> {
    match &operand.kind {
        ExpressionKind::Assign(target, _) => TrackedExpr::from_expr(target),
        _ => TrackedExpr::from_expr(operand),
    }
}

/// Recognizes a single narrowing check (no connectives).
pub fn classify_condition_atom(condition: &Expression) -> Option<ConditionCheck> {
    match &condition.kind {
        ExpressionKind::Binary(op, left, right) => extract_null_check(*op, left, right),
        ExpressionKind::Call(name, args) => extract_type_guard_call(name, args),
        ExpressionKind::Instanceof(operand, class) => {
            let expr = tracked_operand(operand)?;
            let class = ClassId::new(class.clone());
            Some(ConditionCheck::new(
                expr,
                Assumption::InstanceOf(class.clone()),
                Assumption::NotInstanceOf(class),
            ))
        }
        _ => {
            let expr = tracked_operand(condition)?;
            Some(ConditionCheck::new(expr, Assumption::Truthy, Assumption::Falsy))
        }
    }
}

/// Every check in `condition`, looking through `!`, `&&` and `||`, oriented so that
/// `on_true` holds when its own atom is true.
pub fn recognized_checks(condition: &Expression) -> Vec<ConditionCheck> {
    let mut checks = Vec::new();
    collect_checks(condition, false, &mut checks);
    checks
}

fn collect_checks(condition: &Expression, negated: bool, out: &mut Vec<ConditionCheck>) {
    match &condition.kind {
        ExpressionKind::Unary(UnaryOp::Not, inner) => collect_checks(inner, !negated, out),
        ExpressionKind::Binary(BinaryOp::And | BinaryOp::Or, left, right) => {
            collect_checks(left, negated, out);
            collect_checks(right, negated, out);
        }
        _ => {
            if let Some(check) = classify_condition_atom(condition) {
                out.push(if negated { check.negated() } else { check });
            }
        }
    }
}

/// Narrow flow facts based on a condition expression.
///
/// Evaluates the condition (with its side effects, in order) starting from `fact` and returns
/// the facts on its true and false edges; `None` marks an edge that cannot be taken.
pub fn narrow_from_condition(
    evaluator: &mut ExpressionEvaluator<'_, '_>,
    condition: &Expression,
    fact: FlowFact,
    depth: usize,
) -> (Option<FlowFact>, Option<FlowFact>) {
    if depth > evaluator.max_condition_depth() {
        return opaque_condition(evaluator, condition, fact);
    }

    match &condition.kind {
        ExpressionKind::Literal(Literal::Bool(true)) => (Some(fact), None),
        ExpressionKind::Literal(Literal::Bool(false)) => (None, Some(fact)),

        // not condition (flip the branches)
        ExpressionKind::Unary(UnaryOp::Not, operand) => {
            let (then_fact, else_fact) = narrow_from_condition(evaluator, operand, fact, depth + 1);
            (else_fact, then_fact)
        }

        // left && right: right only runs where left held
        ExpressionKind::Binary(BinaryOp::And, left, right) => {
            let (left_then, left_else) = narrow_from_condition(evaluator, left, fact, depth + 1);
            let (right_then, right_else) = match left_then {
                Some(f) => narrow_from_condition(evaluator, right, f, depth + 1),
                None => (None, None),
            };
            (right_then, FlowFact::join_options(left_else, right_else))
        }

        // left || right: right only runs where left failed
        ExpressionKind::Binary(BinaryOp::Or, left, right) => {
            let (left_then, left_else) = narrow_from_condition(evaluator, left, fact, depth + 1);
            let (right_then, right_else) = match left_else {
                Some(f) => narrow_from_condition(evaluator, right, f, depth + 1),
                None => (None, None),
            };
            (FlowFact::join_options(left_then, right_then), right_else)
        }

        _ => match classify_condition_atom(condition) {
            Some(check) => {
                let mut fact = fact;
                evaluator.eval(condition, &mut fact);
                let then_fact =
                    apply_assumption(evaluator, fact.clone(), &check.expr, &check.on_true, condition);
                let else_fact =
                    apply_assumption(evaluator, fact, &check.expr, &check.on_false, condition);
                (Some(then_fact), Some(else_fact))
            }
            None => opaque_condition(evaluator, condition, fact),
        },
    }
}

fn opaque_condition(
    evaluator: &mut ExpressionEvaluator<'_, '_>,
    condition: &Expression,
    fact: FlowFact,
) -> (Option<FlowFact>, Option<FlowFact>) {
    let fact = evaluate_without_narrowing(evaluator, condition, fact);
    (Some(fact.clone()), Some(fact))
}

/// Short-circuit operands may or may not run: the result covers both.
fn evaluate_without_narrowing(
    evaluator: &mut ExpressionEvaluator<'_, '_>,
    condition: &Expression,
    mut fact: FlowFact,
) -> FlowFact {
    match &condition.kind {
        ExpressionKind::Binary(BinaryOp::And | BinaryOp::Or, left, right) => {
            let after_left = evaluate_without_narrowing(evaluator, left, fact);
            let after_right = evaluate_without_narrowing(evaluator, right, after_left.clone());
            after_left.join(&after_right)
        }
        ExpressionKind::Unary(UnaryOp::Not, operand) => {
            evaluate_without_narrowing(evaluator, operand, fact)
        }
        _ => {
            evaluator.eval(condition, &mut fact);
            fact
        }
    }
}

fn apply_assumption(
    evaluator: &mut ExpressionEvaluator<'_, '_>,
    mut fact: FlowFact,
    expr: &TrackedExpr,
    assumption: &Assumption,
    condition: &Expression,
) -> FlowFact {
    let current = evaluator.current_type(expr, &fact);
    let narrowed = TypeCompatibility::narrow(&current, assumption, evaluator.env());
    if narrowed.is_never() && !current.is_never() {
        evaluator.report_unreachable_narrowing(condition, expr, &current);
    }
    fact.refine(expr.clone(), narrowed);
    fact
}
