//! Helper modules for the type checker
//!
//! Small pure functions shared by the evaluator and the compatibility rules.

pub mod type_utilities;
