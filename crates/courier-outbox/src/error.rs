//! Outbox error types.

use crate::registry::HandlerError;
use thiserror::Error;

/// Why a stored target or type marker could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Nothing is registered under the module part of the path.
    #[error("Module not found: {module}")]
    ModuleNotFound { module: String },

    /// The module is known but has no such name.
    #[error("Attribute '{attribute}' not found in module '{module}'")]
    AttributeNotFound { module: String, attribute: String },

    /// The path has no `module.name` shape.
    #[error("Malformed target path: {0:?}")]
    MalformedTarget(String),
}

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] courier_database::DatabaseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid settings or strategy name
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Stored target or type marker no longer resolves
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// The business callable failed or panicked
    #[error("Invocation of {target} failed: {source}")]
    Invocation {
        target: String,
        #[source]
        source: HandlerError,
    },

    /// An argument cannot be stored faithfully
    #[error("Cannot serialize argument: {0}")]
    Serialization(String),

    /// A stored envelope cannot be decoded
    #[error("Corrupt envelope {id}: {reason}")]
    CorruptEnvelope { id: i64, reason: String },

    /// A target key was registered twice
    #[error("Target already registered: {0}")]
    DuplicateTarget(String),
}

impl OutboxError {
    /// Retrying the same envelope can never succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboxError::Resolution(_) | OutboxError::CorruptEnvelope { .. }
        )
    }
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
