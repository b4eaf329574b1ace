pub mod context;
pub mod type_compat;
pub mod type_environment;

pub use context::CheckContext;
pub use type_compat::{Assumption, TypeCompatibility};
pub use type_environment::{ClassInfo, PropertyInfo, TypeEnvironment};
