use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StrictLevel {
    #[serde(rename = "off")]
    Off,
    #[serde(rename = "warning")]
    #[default]
    Warning,
    #[serde(rename = "error")]
    Error,
}

/// Options that control narrowing and compatibility checking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckerOptions {
    /// How a branch that narrows a tracked expression to `never` is reported (default: warning)
    #[serde(default)]
    pub unreachable_narrowing: StrictLevel,

    /// Functions to treat as side-effect free in addition to the signature table's own list
    #[serde(default)]
    pub extra_pure_functions: Vec<String>,

    /// Connective nesting depth up to which conditions are decomposed for narrowing (default: 32)
    #[serde(default = "default_max_condition_depth")]
    pub max_condition_depth: usize,

    /// Block visits allowed per unit before the engine gives up on narrowing (default: 10000)
    #[serde(default = "default_max_fixpoint_iterations")]
    pub max_fixpoint_iterations: usize,

    /// Pretty-print diagnostics (default: true)
    #[serde(default = "default_true")]
    pub pretty: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_condition_depth() -> usize {
    32
}

fn default_max_fixpoint_iterations() -> usize {
    10_000
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            unreachable_narrowing: StrictLevel::Warning,
            extra_pure_functions: Vec::new(),
            max_condition_depth: default_max_condition_depth(),
            max_fixpoint_iterations: default_max_fixpoint_iterations(),
            pretty: true,
        }
    }
}

impl CheckerOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fixpoint_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "maxFixpointIterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main checker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckerConfig {
    #[serde(default)]
    pub checker_options: CheckerOptions,
}

impl CheckerConfig {
    /// Load configuration from a YAML file (smartcast.config.yaml)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CheckerConfig = serde_yaml::from_str(content)?;
        config.checker_options.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: CheckerConfig = serde_json::from_str(content)?;
        config.checker_options.validate()?;
        Ok(config)
    }

    /// Merge this configuration with host overrides
    /// Only non-None override values replace file values
    pub fn merge(&mut self, overrides: &CheckerOverrides) {
        if let Some(level) = overrides.unreachable_narrowing {
            self.checker_options.unreachable_narrowing = level;
        }
        if let Some(ref extra) = overrides.extra_pure_functions {
            self.checker_options.extra_pure_functions = extra.clone();
        }
        if let Some(depth) = overrides.max_condition_depth {
            self.checker_options.max_condition_depth = depth;
        }
        if let Some(iterations) = overrides.max_fixpoint_iterations {
            self.checker_options.max_fixpoint_iterations = iterations;
        }
        if let Some(pretty) = overrides.pretty {
            self.checker_options.pretty = pretty;
        }
    }
}

/// Overrides supplied by the host pipeline
/// All fields are optional - only specified values override file config
#[derive(Debug, Default, Clone)]
pub struct CheckerOverrides {
    pub unreachable_narrowing: Option<StrictLevel>,
    pub extra_pure_functions: Option<Vec<String>>,
    pub max_condition_depth: Option<usize>,
    pub max_fixpoint_iterations: Option<usize>,
    pub pretty: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CheckerConfig::default();
        assert_eq!(
            config.checker_options.unreachable_narrowing,
            StrictLevel::Warning
        );
        assert_eq!(config.checker_options.max_condition_depth, 32);
        assert!(config.checker_options.pretty);
    }

    #[test]
    fn test_serialize_config() {
        let config = CheckerConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("checkerOptions"));
        assert!(yaml.contains("unreachableNarrowing"));
    }

    #[test]
    fn test_deserialize_yaml() {
        let yaml = r#"
checkerOptions:
  unreachableNarrowing: error
  extraPureFunctions:
    - log_line
"#;
        let config = CheckerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.checker_options.unreachable_narrowing,
            StrictLevel::Error
        );
        assert_eq!(config.checker_options.extra_pure_functions, vec!["log_line"]);
        assert_eq!(config.checker_options.max_fixpoint_iterations, 10_000);
    }

    #[test]
    fn test_deserialize_json() {
        let json = r#"{"checkerOptions":{"maxConditionDepth":4,"pretty":false}}"#;
        let config = CheckerConfig::from_json_str(json).unwrap();
        assert_eq!(config.checker_options.max_condition_depth, 4);
        assert!(!config.checker_options.pretty);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let json = r#"{"checkerOptions":{"maxFixpointIterations":0}}"#;
        assert!(matches!(
            CheckerConfig::from_json_str(json),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            CheckerConfig::from_json_str("{\"checkerOptions\": 7}"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_merge_partial_overrides() {
        let mut config = CheckerConfig::default();
        let overrides = CheckerOverrides {
            unreachable_narrowing: Some(StrictLevel::Off),
            ..Default::default()
        };
        config.merge(&overrides);
        assert_eq!(config.checker_options.unreachable_narrowing, StrictLevel::Off);
        assert_eq!(config.checker_options.max_condition_depth, 32);
        assert!(config.checker_options.pretty);
    }
}
