//! Error types for the room director.
//!
//! Each tier gets its own enum: model calls ([`ModelError`]), the entity
//! store ([`StoreError`]), configuration ([`ConfigError`]) and the public
//! director API ([`DirectorError`]).

use crate::entity::EntityId;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single model call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The endpoint could not be reached or refused the request.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within its deadline.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with something unusable.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether a failure of this kind may be handed to the next variant.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, ModelError::Unavailable(_) | ModelError::Timeout(_))
    }
}

impl From<llm::Error> for ModelError {
    fn from(err: llm::Error) -> Self {
        match err {
            llm::Error::Timeout => ModelError::Timeout(Duration::ZERO),
            llm::Error::Network(msg) | llm::Error::Config(msg) => ModelError::Unavailable(msg),
            llm::Error::Api { status, message } => {
                ModelError::Unavailable(format!("HTTP {status}: {message}"))
            }
            llm::Error::Parse(msg) => ModelError::InvalidResponse(msg),
        }
    }
}

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors surfaced by the director API.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("an entity named '{name}' already exists")]
    NameTaken { name: String },

    #[error("fact not found: {key}")]
    NotFound { key: String },

    #[error("fact '{key}' is pinned")]
    PinnedFact { key: String },

    #[error("invalid fact: {0}")]
    InvalidFact(String),

    #[error("nothing to describe for entity {0}")]
    InsufficientContext(EntityId),

    #[error("description generation unavailable: {reason}")]
    GenerationUnavailable { reason: String },

    #[error("regeneration already in progress for entity {0}")]
    AlreadyInProgress(EntityId),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl DirectorError {
    /// True for outcomes that are a no-op signal rather than a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, DirectorError::AlreadyInProgress(_))
    }
}

impl From<StoreError> for DirectorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DirectorError::EntityNotFound(id),
            other => DirectorError::Store(other),
        }
    }
}

impl From<ModelError> for DirectorError {
    fn from(err: ModelError) -> Self {
        DirectorError::GenerationUnavailable {
            reason: err.to_string(),
        }
    }
}

/// Result type for director operations.
pub type DirectorResult<T> = Result<T, DirectorError>;
