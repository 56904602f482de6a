//! Error types for the autoload compiler
//!
//! All errors are structural or configuration errors discovered during
//! graph construction or plan compilation. They are surfaced synchronously
//! and never retried; a failed compilation produces no cached entry.

use thiserror::Error;

/// Result type alias for compiler operations
pub type AutoloadResult<T> = Result<T, AutoloadError>;

/// Error types for graph construction and plan compilation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AutoloadError {
    /// Graph build-time error: the schema metadata is inconsistent
    #[error("Schema error: {0}")]
    Schema(String),

    /// `compile` was called before the relationship graph was initialized
    #[error("Relationship graph is not initialized")]
    GraphNotInitialized,

    /// The requested root entity type is not present in the graph
    #[error("Unknown entity type '{0}'")]
    UnknownEntity(String),

    /// A relationship key does not exist on the given entity type
    #[error("Unknown relationship '{key}' on entity '{entity}'")]
    UnknownRelationship { entity: String, key: String },

    /// A load-path segment does not match a relationship at that position
    #[error("No relationship '{segment}' on entity '{entity}' (resolving '{path}' from '{root}')")]
    InvalidPath {
        path: String,
        segment: String,
        entity: String,
        root: String,
    },

    /// A self-referential entity has several candidate foreign keys and no hint
    #[error(
        "Ambiguous self-reference on entity '{entity}': candidate foreign keys {candidates:?}; \
         supply a self_reference_hint to disambiguate"
    )]
    AmbiguousSelfReference {
        entity: String,
        candidates: Vec<String>,
    },

    /// Alias collision resolution is exhausted; the base query must be cleaned up
    #[error("Alias '{0}' collides with the base query even after suffixing")]
    AliasExhausted(String),

    /// The configured backend lacks support required by the chosen strategy
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Invalid compile options or request
    #[error("Configuration error: {0}")]
    Configuration(String),
}
