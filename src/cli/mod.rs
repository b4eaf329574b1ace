pub mod config;

pub use config::{CheckerConfig, CheckerOptions, CheckerOverrides, StrictLevel};
