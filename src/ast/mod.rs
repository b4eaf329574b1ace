//! Owned syntax tree handed over by the parser front-end.
//!
//! Names are stored without the `$` sigil; the receiver inside methods is the variable `this`.
//! Type hints are already parsed into [`Type`] values.

pub mod builder;

use crate::span::Span;
use crate::types::Type;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub is_interface: bool,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDecl {
    pub name: String,
    #[serde(default)]
    pub type_hint: Option<Type>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<Type>,
    #[serde(default)]
    pub body: Vec<Statement>,
    /// Declared free of side effects (`@kphp-pure-function`)
    #[serde(default)]
    pub is_pure: bool,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub type_hint: Option<Type>,
    #[serde(default)]
    pub by_ref: bool,
    #[serde(default)]
    pub span: Span,
}

impl Param {
    pub fn declared_type(&self) -> Type {
        self.type_hint.clone().unwrap_or(Type::Mixed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatementKind {
    Expression(Expression),
    Echo(Vec<Expression>),
    If {
        condition: Expression,
        then_block: Vec<Statement>,
        else_block: Option<Vec<Statement>>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    DoWhile {
        body: Vec<Statement>,
        condition: Expression,
    },
    For {
        init: Vec<Expression>,
        condition: Option<Expression>,
        update: Vec<Expression>,
        body: Vec<Statement>,
    },
    Foreach {
        subject: Expression,
        key: Option<Expression>,
        value: Expression,
        by_ref: bool,
        body: Vec<Statement>,
    },
    Return(Option<Expression>),
    Break,
    Continue,
    Throw(Expression),
    Try {
        body: Vec<Statement>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Statement>>,
    },
    Block(Vec<Statement>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub classes: Vec<String>,
    pub var: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionKind {
    Literal(Literal),
    Variable(String),
    Property(Box<Expression>, String),
    /// `base[key]`; the key is absent for the append form `base[]`
    Index(Box<Expression>, Option<Box<Expression>>),
    Call(String, Vec<Expression>),
    MethodCall(Box<Expression>, String, Vec<Expression>),
    New(String, Vec<Expression>),
    Array(Vec<ArrayItem>),
    Closure(Box<Closure>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Unary(UnaryOp, Box<Expression>),
    Assign(Box<Expression>, Box<Expression>),
    /// `cond ? then : else`; `then` is absent for the short form `cond ?: else`
    Ternary(Box<Expression>, Option<Box<Expression>>, Box<Expression>),
    Instanceof(Box<Expression>, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayItem {
    pub key: Option<Expression>,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Closure {
    pub params: Vec<Param>,
    #[serde(default)]
    pub uses: Vec<String>,
    #[serde(default)]
    pub return_type: Option<Type>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Identical,
    NotIdentical,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Coalesce,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Concat => ".",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Coalesce => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    PreIncrement,
    PostIncrement,
    PreDecrement,
    PostDecrement,
}

impl UnaryOp {
    pub fn is_increment(&self) -> bool {
        matches!(
            self,
            UnaryOp::PreIncrement
                | UnaryOp::PostIncrement
                | UnaryOp::PreDecrement
                | UnaryOp::PostDecrement
        )
    }
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn as_variable(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Variable(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self.kind, ExpressionKind::Literal(Literal::Null))
    }

    pub fn as_string_literal(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Literal(Literal::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[cfg(test)]
mod tests {
    use super::builder::*;
    use super::*;

    #[test]
    fn test_program_json_roundtrip_keeps_shape() {
        let program = Program {
            classes: vec![class("Foo").property("x", Some(Type::Int)).build()],
            functions: vec![function("f")
                .param("a", Some(Type::instance("Foo")))
                .body(vec![ret(Some(prop(var("a"), "x")))])
                .build()],
            statements: vec![expr_stmt(call("f", vec![new_obj("Foo", vec![])]))],
        };
        let json = serde_json::to_string(&program).unwrap();
        let decoded: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{"functions":[{"name":"g","body":[]}]}"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert!(program.classes.is_empty());
        assert_eq!(program.functions[0].name, "g");
        assert!(!program.functions[0].is_pure);
    }
}
