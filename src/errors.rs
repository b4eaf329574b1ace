use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("Type checking failed with {0} errors")]
    TypeErrors(usize),

    #[error("Signature table error: {0}")]
    Signatures(#[from] SignatureError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Invalid type hint '{hint}': {message}")]
    InvalidHint { hint: String, message: String },

    #[error("Generic slot in '{0}' is only allowed inside a signature table")]
    UnexpectedSlot(String),

    #[error("Malformed signature table: {0}")]
    Malformed(String),

    #[error("Duplicate signature: {0}")]
    Duplicate(String),

    #[error("Signature '{function}' refers to argument {index} but declares {count} parameters")]
    SlotOutOfRange {
        function: String,
        index: usize,
        count: usize,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid YAML options document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON options document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid option value: {0}")]
    InvalidValue(String),
}
