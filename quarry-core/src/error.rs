//! Error types for Quarry operations

use thiserror::Error;

/// Storage backend errors.
///
/// These are produced by `DocumentStore` implementations and travel to the
/// caller of a query helper unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Document not found: {model} with id {id}")]
    NotFound { model: String, id: String },

    #[error("Insert failed for {model}: {reason}")]
    InsertFailed { model: String, reason: String },

    #[error("Update failed for {model} with id {id}: {reason}")]
    UpdateFailed {
        model: String,
        id: String,
        reason: String,
    },

    #[error("Remove failed for {model} with id {id}: {reason}")]
    RemoveFailed {
        model: String,
        id: String,
        reason: String,
    },

    #[error("Unsupported query operator {operator} on {model}")]
    UnsupportedOperator { model: String, operator: String },

    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache collaborator errors.
///
/// Never surfaced by the query helpers: a failed read is treated as a miss
/// and failed writes or clears are dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache read failed for {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Cache write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Cache clear failed for {pattern}: {reason}")]
    ClearFailed { pattern: String, reason: String },

    #[error("Cached value for {key} could not be decoded: {reason}")]
    Decode { key: String, reason: String },
}

/// Configuration errors raised while registering a field policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Malformed policy configuration: {reason}")]
    Malformed { reason: String },
}

/// Master error type for all Quarry errors.
#[derive(Debug, Clone, Error)]
pub enum QuarryError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Quarry operations.
pub type QuarryResult<T> = Result<T, QuarryError>;

// =============================================================================
// TESTS
// =============================================================================
