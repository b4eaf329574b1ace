pub mod compatibility;
pub mod inference;
pub mod narrowing;

pub use compatibility::{
    check_argument, check_call, check_callback, check_index_key, check_property_assignment,
    CallSite,
};
pub use inference::ExpressionEvaluator;
pub use narrowing::{
    classify_condition_atom, narrow_from_condition, recognized_checks, ArrayKey, ConditionCheck,
    FlowFact, Segment, TrackedExpr,
};
