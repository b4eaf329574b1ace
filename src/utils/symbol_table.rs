use crate::ast::{Closure, FunctionDecl};
use crate::span::Span;
use crate::types::{ClassId, Type};
use rustc_hash::FxHashMap;
use tracing::warn;

/// How a variable came into scope before the unit's first statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Parameter,
    Receiver,
    Captured,
}

/// A variable with a declared type
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub typ: Type,
    pub span: Span,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, typ: Type, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            typ,
            span,
        }
    }
}

/// Declared types of the variables of one checked unit.
///
/// Locals are untyped in the source language; anything not declared here reads as `mixed`
/// until flow facts say otherwise.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    symbols: FxHashMap<String, Symbol>,
    receiver: Option<ClassId>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            symbols: FxHashMap::with_capacity_and_hasher(8, Default::default()),
            receiver: None,
        }
    }

    pub fn for_function(decl: &FunctionDecl, receiver: Option<&ClassId>) -> Self {
        let mut scope = Self::new();
        scope.set_receiver(receiver);
        for param in &decl.params {
            scope.declare_first(Symbol::new(
                param.name.clone(),
                SymbolKind::Parameter,
                param.declared_type(),
                param.span,
            ));
        }
        scope
    }

    /// Captured variables are `mixed`: their type at capture time belongs to the enclosing unit.
    pub fn for_closure(closure: &Closure, receiver: Option<&ClassId>, span: Span) -> Self {
        let mut scope = Self::new();
        scope.set_receiver(receiver);
        for param in &closure.params {
            scope.declare_first(Symbol::new(
                param.name.clone(),
                SymbolKind::Parameter,
                param.declared_type(),
                param.span,
            ));
        }
        for name in &closure.uses {
            scope.declare_first(Symbol::new(name.clone(), SymbolKind::Captured, Type::Mixed, span));
        }
        scope
    }

    /// The first declaration of a name wins; later ones are logged and ignored.
    fn declare_first(&mut self, symbol: Symbol) {
        let span = symbol.span;
        if let Err(message) = self.declare(symbol) {
            warn!(%span, "{}", message);
        }
    }

    fn set_receiver(&mut self, receiver: Option<&ClassId>) {
        if let Some(class) = receiver {
            self.receiver = Some(class.clone());
            self.symbols.insert(
                "this".to_string(),
                Symbol::new("this", SymbolKind::Receiver, Type::Instance(class.clone()), Span::dummy()),
            );
        }
    }

    /// Declare a symbol in this scope
    pub fn declare(&mut self, symbol: Symbol) -> Result<(), String> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(format!(
                "Symbol '{}' already declared in this scope",
                symbol.name
            ));
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn declared_type(&self, name: &str) -> Type {
        self.lookup(name).map_or(Type::Mixed, |s| s.typ.clone())
    }

    pub fn receiver(&self) -> Option<&ClassId> {
        self.receiver.as_ref()
    }

    /// Symbols in a stable order
    pub fn symbols(&self) -> Vec<&Symbol> {
        let mut symbols: Vec<&Symbol> = self.symbols.values().collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    #[test]
    fn test_function_scope() {
        let decl = function("f")
            .param("a", Some(Type::nullable(Type::instance("Foo"))))
            .param("b", None)
            .build();
        let scope = Scope::for_function(&decl, Some(&ClassId::new("Owner")));
        assert_eq!(scope.declared_type("a"), Type::nullable(Type::instance("Foo")));
        assert_eq!(scope.declared_type("b"), Type::Mixed);
        assert_eq!(scope.declared_type("local"), Type::Mixed);
        assert_eq!(scope.declared_type("this"), Type::instance("Owner"));
        assert_eq!(scope.lookup("this").map(|s| s.kind), Some(SymbolKind::Receiver));
    }

    #[test]
    fn test_closure_scope_captures_are_mixed() {
        let expr = closure_with_uses(vec![param("x", Some(Type::Int))], vec!["total"], None, vec![]);
        let crate::ast::ExpressionKind::Closure(closure) = &expr.kind else {
            panic!("expected a closure");
        };
        let scope = Scope::for_closure(closure, None, expr.span);
        assert_eq!(scope.declared_type("x"), Type::Int);
        assert_eq!(scope.lookup("total").map(|s| s.kind), Some(SymbolKind::Captured));
        assert!(scope.receiver().is_none());
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut scope = Scope::new();
        assert!(scope
            .declare(Symbol::new("a", SymbolKind::Parameter, Type::Int, Span::dummy()))
            .is_ok());
        assert!(scope
            .declare(Symbol::new("a", SymbolKind::Parameter, Type::String, Span::dummy()))
            .is_err());
        assert_eq!(scope.declared_type("a"), Type::Int);
    }

    #[test]
    fn test_first_parameter_declaration_wins() {
        let decl = function("f")
            .param("a", Some(Type::Int))
            .param("a", Some(Type::String))
            .build();
        let scope = Scope::for_function(&decl, None);
        assert_eq!(scope.declared_type("a"), Type::Int);

        let expr = closure_with_uses(vec![param("x", Some(Type::Int))], vec!["x"], None, vec![]);
        let crate::ast::ExpressionKind::Closure(closure) = &expr.kind else {
            panic!("expected a closure");
        };
        let scope = Scope::for_closure(closure, None, expr.span);
        assert_eq!(scope.lookup("x").map(|s| s.kind), Some(SymbolKind::Parameter));
        assert_eq!(scope.declared_type("x"), Type::Int);
    }
}
