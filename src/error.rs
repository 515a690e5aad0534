//! Error types for reasonbench.

use thiserror::Error;

use crate::domain::FailureReason;

/// Result type alias using reasonbench's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during evaluation operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Invalid configuration (env vars, agent config, CLI arguments)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Illegal evaluation status transition
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A classified failure from the LLM access layer
    #[error("Evaluation failed: {0}")]
    Failure(FailureReason),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<FailureReason> for Error {
    fn from(reason: FailureReason) -> Self {
        match reason.category {
            crate::domain::FailureCategory::ConfigurationError => {
                Self::Config(reason.description)
            }
            _ => Self::Failure(reason),
        }
    }
}
