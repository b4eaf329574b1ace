use crate::ast::{Closure, Program, Statement};
use crate::cfg::builder::CfgBuilder;
use crate::cli::config::CheckerOptions;
use crate::core::type_environment::TypeEnvironment;
use crate::narrowing_engine::NarrowingEngine;
use crate::state::metrics::Metrics;
use crate::stdlib::{FunctionSignature, PurityPolicy, SignatureOrigin, SignatureTable};
use crate::types::template::SlotBindings;
use crate::types::{ClassId, Type, MAX_ARRAY_DEPTH};
use crate::utils::symbol_table::Scope;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use tracing::debug;

/// A body whose return type may be inferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DeclKey {
    Function(usize),
    Method { class: usize, method: usize },
    /// Address of the closure node inside the checked program
    Closure(usize),
}

#[derive(Debug, Clone)]
enum InferState {
    InProgress,
    Done(Type),
}

/// Read-only inputs shared by every unit of one program check, plus the return types inferred
/// so far.
pub struct CheckContext<'a> {
    pub program: &'a Program,
    pub env: &'a TypeEnvironment,
    pub signatures: &'a SignatureTable,
    pub policy: &'a PurityPolicy,
    pub options: &'a CheckerOptions,
    metrics: Option<&'a Metrics>,
    returns: RefCell<FxHashMap<DeclKey, InferState>>,
}

impl<'a> CheckContext<'a> {
    pub fn new(
        program: &'a Program,
        env: &'a TypeEnvironment,
        signatures: &'a SignatureTable,
        policy: &'a PurityPolicy,
        options: &'a CheckerOptions,
    ) -> Self {
        Self {
            program,
            env,
            signatures,
            policy,
            options,
            metrics: None,
            returns: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn with_metrics(mut self, metrics: &'a Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&'a Metrics> {
        self.metrics
    }

    /// User functions shadow built-ins of the same name.
    pub fn resolve_function(&self, name: &str) -> Option<&'a FunctionSignature> {
        self.env
            .lookup_function(name)
            .or_else(|| self.signatures.get(name))
    }

    /// Declared return type, or the inferred one when the declaration has none.
    pub fn return_type(&self, signature: &FunctionSignature) -> Type {
        match &signature.returns {
            Some(template) => template.instantiate(&SlotBindings::default()),
            None => self.infer_return(signature),
        }
    }

    pub fn infer_return(&self, signature: &FunctionSignature) -> Type {
        match signature.origin {
            SignatureOrigin::Builtin => Type::Mixed,
            SignatureOrigin::Function(index) => match self.program.functions.get(index) {
                Some(decl) => self.infer_cached(
                    DeclKey::Function(index),
                    &decl.body,
                    || Scope::for_function(decl, None),
                ),
                None => Type::Mixed,
            },
            SignatureOrigin::Method { class, method } => {
                let Some(class_decl) = self.program.classes.get(class) else {
                    return Type::Mixed;
                };
                let Some(decl) = class_decl.methods.get(method) else {
                    return Type::Mixed;
                };
                let receiver = ClassId::new(class_decl.name.clone());
                self.infer_cached(DeclKey::Method { class, method }, &decl.body, || {
                    Scope::for_function(decl, Some(&receiver))
                })
            }
        }
    }

    pub fn infer_closure_return(&self, closure: &Closure, receiver: Option<&ClassId>) -> Type {
        let key = DeclKey::Closure(closure as *const Closure as usize);
        self.infer_cached(key, &closure.body, || {
            Scope::for_closure(closure, receiver, Default::default())
        })
    }

    /// Joins the types of every reachable `return`; a body that is still being inferred
    /// (recursion) reads as `mixed`.
    fn infer_cached(
        &self,
        key: DeclKey,
        body: &[Statement],
        scope: impl FnOnce() -> Scope,
    ) -> Type {
        let cached = self.returns.borrow().get(&key).cloned();
        match cached {
            Some(InferState::Done(ty)) => return ty,
            Some(InferState::InProgress) => return Type::Mixed,
            None => {}
        }
        self.returns.borrow_mut().insert(key, InferState::InProgress);

        let scope = scope();
        let cfg = CfgBuilder::new().build(body);
        let engine = NarrowingEngine::new(self, &scope);
        let analysis = engine.run(&cfg);
        let outcome = engine.replay(&cfg, &analysis, false);
        let inferred = Type::union(outcome.returns).widen(MAX_ARRAY_DEPTH);

        debug!(?key, inferred = %inferred, "inferred return type");
        if let Some(metrics) = self.metrics {
            metrics.record_return_inference();
        }
        self.returns
            .borrow_mut()
            .insert(key, InferState::Done(inferred.clone()));
        inferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;
    use crate::stdlib::builtins;

    fn check(program: &Program, f: impl FnOnce(&CheckContext<'_>)) {
        let env = TypeEnvironment::from_program(program);
        let table = builtins().unwrap();
        let policy = PurityPolicy::new(table, &program.functions, &[]);
        let options = CheckerOptions::default();
        let ctx = CheckContext::new(program, &env, table, &policy, &options);
        f(&ctx);
    }

    #[test]
    fn test_user_function_shadows_builtin() {
        let program = Program {
            functions: vec![function("strlen").returns(Type::Float).build()],
            ..Default::default()
        };
        check(&program, |ctx| {
            let signature = ctx.resolve_function("STRLEN").unwrap();
            assert_eq!(ctx.return_type(signature), Type::Float);
            assert!(ctx.resolve_function("count").is_some());
            assert!(ctx.resolve_function("nope").is_none());
        });
    }

    #[test]
    fn test_infers_joined_returns() {
        let program = Program {
            functions: vec![function("pick")
                .param("flag", Some(Type::Bool))
                .body(vec![
                    if_stmt(var("flag"), vec![ret(Some(int(1)))], None),
                    ret(Some(string("no"))),
                ])
                .build()],
            ..Default::default()
        };
        check(&program, |ctx| {
            let signature = ctx.resolve_function("pick").unwrap();
            assert_eq!(
                ctx.return_type(signature),
                Type::union([Type::Int, Type::String])
            );
        });
    }

    #[test]
    fn test_recursion_reads_as_mixed() {
        let program = Program {
            functions: vec![function("loop_forever")
                .body(vec![ret(Some(call("loop_forever", vec![])))])
                .build()],
            ..Default::default()
        };
        check(&program, |ctx| {
            let signature = ctx.resolve_function("loop_forever").unwrap();
            assert_eq!(ctx.infer_return(signature), Type::Mixed);
        });
    }

    #[test]
    fn test_fall_off_returns_null() {
        let program = Program {
            classes: vec![class("Box")
                .method(function("nothing").build())
                .build()],
            ..Default::default()
        };
        check(&program, |ctx| {
            let signature = ctx.env.method(&ClassId::new("Box"), "nothing").unwrap();
            assert_eq!(ctx.infer_return(signature), Type::Null);
        });
    }
}
