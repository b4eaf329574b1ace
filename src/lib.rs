//! Flow-sensitive type narrowing and call-site compatibility checking.
//!
//! The checker takes an already-inferred [`Program`], narrows the types of variables and
//! access chains along every control-flow path, and reports values whose type at the point of
//! use is not accepted there: nullable arguments, wrong index keys, incompatible callbacks and
//! property assignments.

pub mod ast;
pub mod cfg;
pub mod cli;
pub mod core;
pub mod diagnostics;
pub mod errors;
mod helpers;
pub mod narrowing_engine;
pub mod span;
pub mod state;
pub mod stdlib;
mod type_checker;
pub mod types;
pub mod utils;
pub mod visitors;

pub use ast::Program;
pub use cli::config::{CheckerConfig, CheckerOptions, CheckerOverrides, StrictLevel};
pub use crate::core::context::CheckContext;
pub use crate::core::type_compat::{Assumption, TypeCompatibility};
pub use crate::core::type_environment::TypeEnvironment;
pub use diagnostics::{
    CollectingDiagnosticHandler, CompilationResult, ConsoleDiagnosticHandler, Diagnostic,
    DiagnosticHandler, DiagnosticLevel, MismatchKind, TypeMismatch,
};
pub use errors::{CompilationError, ConfigError, SignatureError};
pub use narrowing_engine::{FlowAnalysis, NarrowingEngine, UnitOutcome};
pub use span::Span;
pub use state::metrics::Metrics;
pub use stdlib::{builtins, FunctionSignature, PurityPolicy, SignatureTable};
pub use type_checker::TypeChecker;
pub use types::{ClassId, Type};
pub use visitors::narrowing::{FlowFact, TrackedExpr};
