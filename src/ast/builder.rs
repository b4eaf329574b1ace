//! Terse constructors for building trees in tests, benches and the profiler.
//!
//! Every node built here gets a fresh span from a per-thread counter, so nodes built in
//! sequence sort in construction order and never compare equal by location.

use super::*;
use std::cell::Cell;

thread_local! {
    static NEXT_OFFSET: Cell<u32> = const { Cell::new(1) };
}

pub fn next_span() -> Span {
    NEXT_OFFSET.with(|next| {
        let offset = next.get();
        next.set(offset + 1);
        Span::new(offset, offset + 1, offset, 1)
    })
}

fn expr(kind: ExpressionKind) -> Expression {
    Expression::new(kind, next_span())
}

fn stmt(kind: StatementKind) -> Statement {
    Statement::new(kind, next_span())
}

pub fn null() -> Expression {
    expr(ExpressionKind::Literal(Literal::Null))
}

pub fn bool_lit(value: bool) -> Expression {
    expr(ExpressionKind::Literal(Literal::Bool(value)))
}

pub fn int(value: i64) -> Expression {
    expr(ExpressionKind::Literal(Literal::Int(value)))
}

pub fn float(value: f64) -> Expression {
    expr(ExpressionKind::Literal(Literal::Float(value)))
}

pub fn string(value: &str) -> Expression {
    expr(ExpressionKind::Literal(Literal::String(value.to_string())))
}

pub fn var(name: &str) -> Expression {
    expr(ExpressionKind::Variable(name.to_string()))
}

pub fn this() -> Expression {
    var("this")
}

pub fn prop(object: Expression, name: &str) -> Expression {
    expr(ExpressionKind::Property(Box::new(object), name.to_string()))
}

pub fn index(base: Expression, key: Expression) -> Expression {
    expr(ExpressionKind::Index(Box::new(base), Some(Box::new(key))))
}

pub fn append(base: Expression) -> Expression {
    expr(ExpressionKind::Index(Box::new(base), None))
}

pub fn call(name: &str, args: Vec<Expression>) -> Expression {
    expr(ExpressionKind::Call(name.to_string(), args))
}

pub fn method(receiver: Expression, name: &str, args: Vec<Expression>) -> Expression {
    expr(ExpressionKind::MethodCall(
        Box::new(receiver),
        name.to_string(),
        args,
    ))
}

pub fn new_obj(class: &str, args: Vec<Expression>) -> Expression {
    expr(ExpressionKind::New(class.to_string(), args))
}

pub fn array(values: Vec<Expression>) -> Expression {
    expr(ExpressionKind::Array(
        values
            .into_iter()
            .map(|value| ArrayItem { key: None, value })
            .collect(),
    ))
}

pub fn array_kv(items: Vec<(Expression, Expression)>) -> Expression {
    expr(ExpressionKind::Array(
        items
            .into_iter()
            .map(|(key, value)| ArrayItem {
                key: Some(key),
                value,
            })
            .collect(),
    ))
}

pub fn closure(params: Vec<Param>, return_type: Option<Type>, body: Vec<Statement>) -> Expression {
    closure_with_uses(params, Vec::new(), return_type, body)
}

pub fn closure_with_uses(
    params: Vec<Param>,
    uses: Vec<&str>,
    return_type: Option<Type>,
    body: Vec<Statement>,
) -> Expression {
    expr(ExpressionKind::Closure(Box::new(Closure {
        params,
        uses: uses.into_iter().map(str::to_string).collect(),
        return_type,
        body,
    })))
}

pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    expr(ExpressionKind::Binary(op, Box::new(left), Box::new(right)))
}

pub fn identical(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::Identical, left, right)
}

pub fn not_identical(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::NotIdentical, left, right)
}

pub fn and(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::And, left, right)
}

pub fn or(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::Or, left, right)
}

pub fn unary(op: UnaryOp, operand: Expression) -> Expression {
    expr(ExpressionKind::Unary(op, Box::new(operand)))
}

pub fn not(operand: Expression) -> Expression {
    unary(UnaryOp::Not, operand)
}

pub fn post_inc(operand: Expression) -> Expression {
    unary(UnaryOp::PostIncrement, operand)
}

pub fn assign(target: Expression, value: Expression) -> Expression {
    expr(ExpressionKind::Assign(Box::new(target), Box::new(value)))
}

pub fn ternary(condition: Expression, then: Expression, otherwise: Expression) -> Expression {
    expr(ExpressionKind::Ternary(
        Box::new(condition),
        Some(Box::new(then)),
        Box::new(otherwise),
    ))
}

/// `condition ?: otherwise`
pub fn short_ternary(condition: Expression, otherwise: Expression) -> Expression {
    expr(ExpressionKind::Ternary(Box::new(condition), None, Box::new(otherwise)))
}

pub fn instance_of(operand: Expression, class: &str) -> Expression {
    expr(ExpressionKind::Instanceof(Box::new(operand), class.to_string()))
}

pub fn expr_stmt(expression: Expression) -> Statement {
    stmt(StatementKind::Expression(expression))
}

pub fn echo(expression: Expression) -> Statement {
    stmt(StatementKind::Echo(vec![expression]))
}

pub fn if_stmt(
    condition: Expression,
    then_block: Vec<Statement>,
    else_block: Option<Vec<Statement>>,
) -> Statement {
    stmt(StatementKind::If {
        condition,
        then_block,
        else_block,
    })
}

pub fn while_stmt(condition: Expression, body: Vec<Statement>) -> Statement {
    stmt(StatementKind::While { condition, body })
}

pub fn do_while(body: Vec<Statement>, condition: Expression) -> Statement {
    stmt(StatementKind::DoWhile { body, condition })
}

pub fn for_stmt(
    init: Vec<Expression>,
    condition: Option<Expression>,
    update: Vec<Expression>,
    body: Vec<Statement>,
) -> Statement {
    stmt(StatementKind::For {
        init,
        condition,
        update,
        body,
    })
}

pub fn foreach(
    subject: Expression,
    key: Option<Expression>,
    value: Expression,
    body: Vec<Statement>,
) -> Statement {
    stmt(StatementKind::Foreach {
        subject,
        key,
        value,
        by_ref: false,
        body,
    })
}

/// `foreach ($subject as &$value)`
pub fn foreach_by_ref(subject: Expression, value: Expression, body: Vec<Statement>) -> Statement {
    stmt(StatementKind::Foreach {
        subject,
        key: None,
        value,
        by_ref: true,
        body,
    })
}

pub fn ret(value: Option<Expression>) -> Statement {
    stmt(StatementKind::Return(value))
}

pub fn break_stmt() -> Statement {
    stmt(StatementKind::Break)
}

pub fn continue_stmt() -> Statement {
    stmt(StatementKind::Continue)
}

pub fn throw(value: Expression) -> Statement {
    stmt(StatementKind::Throw(value))
}

pub fn try_stmt(
    body: Vec<Statement>,
    catches: Vec<CatchClause>,
    finally: Option<Vec<Statement>>,
) -> Statement {
    stmt(StatementKind::Try {
        body,
        catches,
        finally,
    })
}

pub fn catch_clause(classes: &[&str], var: Option<&str>, body: Vec<Statement>) -> CatchClause {
    CatchClause {
        classes: classes.iter().map(|c| c.to_string()).collect(),
        var: var.map(str::to_string),
        body,
    }
}

pub fn block(statements: Vec<Statement>) -> Statement {
    stmt(StatementKind::Block(statements))
}

pub fn param(name: &str, type_hint: Option<Type>) -> Param {
    Param {
        name: name.to_string(),
        type_hint,
        by_ref: false,
        span: next_span(),
    }
}

pub fn function(name: &str) -> FunctionBuilder {
    FunctionBuilder {
        decl: FunctionDecl {
            name: name.to_string(),
            params: Vec::new(),
            return_type: None,
            body: Vec::new(),
            is_pure: false,
            span: next_span(),
        },
    }
}

pub struct FunctionBuilder {
    decl: FunctionDecl,
}

impl FunctionBuilder {
    pub fn param(mut self, name: &str, type_hint: Option<Type>) -> Self {
        self.decl.params.push(param(name, type_hint));
        self
    }

    pub fn param_by_ref(mut self, name: &str, type_hint: Option<Type>) -> Self {
        let mut p = param(name, type_hint);
        p.by_ref = true;
        self.decl.params.push(p);
        self
    }

    pub fn returns(mut self, return_type: Type) -> Self {
        self.decl.return_type = Some(return_type);
        self
    }

    pub fn pure(mut self) -> Self {
        self.decl.is_pure = true;
        self
    }

    pub fn body(mut self, body: Vec<Statement>) -> Self {
        self.decl.body = body;
        self
    }

    pub fn build(self) -> FunctionDecl {
        self.decl
    }
}

pub fn class(name: &str) -> ClassBuilder {
    ClassBuilder {
        decl: ClassDecl {
            name: name.to_string(),
            parent: None,
            interfaces: Vec::new(),
            is_interface: false,
            properties: Vec::new(),
            methods: Vec::new(),
            span: next_span(),
        },
    }
}

pub struct ClassBuilder {
    decl: ClassDecl,
}

impl ClassBuilder {
    pub fn extends(mut self, parent: &str) -> Self {
        self.decl.parent = Some(parent.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.decl.interfaces.push(interface.to_string());
        self
    }

    pub fn interface(mut self) -> Self {
        self.decl.is_interface = true;
        self
    }

    pub fn property(mut self, name: &str, type_hint: Option<Type>) -> Self {
        self.decl.properties.push(PropertyDecl {
            name: name.to_string(),
            type_hint,
            span: next_span(),
        });
        self
    }

    pub fn method(mut self, method: FunctionDecl) -> Self {
        self.decl.methods.push(method);
        self
    }

    pub fn build(self) -> ClassDecl {
        self.decl
    }
}
