//! Rule Engine Error Types

use thiserror::Error;

/// Result type for rule engine operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Rule engine errors
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule's action returned an error while firing
    #[error("Action of rule '{rule}' failed: {source}")]
    Action {
        rule: String,
        #[source]
        source: anyhow::Error,
    },

    /// A rule's condition returned an error while being evaluated
    #[error("Condition of rule '{rule}' failed: {source}")]
    Condition {
        rule: String,
        #[source]
        source: anyhow::Error,
    },

    /// An event listener returned an error
    #[error("Listener for '{kind}' event failed: {source}")]
    Listener {
        kind: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Queued changes kept producing new passes past the configured bound
    #[error("Fire cycle did not converge after {passes} passes")]
    Divergence { passes: usize },

    /// Invalid declarative rule definition
    #[error("Invalid rule definition: {0}")]
    Definition(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RuleError {
    pub fn definition(msg: impl Into<String>) -> Self {
        Self::Definition(msg.into())
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for RuleError {
    fn from(err: serde_yaml::Error) -> Self {
        RuleError::Serialization(err.to_string())
    }
}
