//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Infrastructure
/// concerns (failed ERP lookups, lock poisoning) belong to the infra layer and
/// are absorbed there rather than surfaced through this enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Presence verification failed (wrong or missing presence key).
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// A scan code could not be resolved against the item catalog.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// A mutation was attempted on a finalized session.
    #[error("session is finalized")]
    SessionClosed,

    /// A final adjustment was attempted while conflict items remain unchosen.
    #[error("unresolved conflicts remain: {0}")]
    IncompleteResolution(String),

    /// A closure transition was attempted while children are still open.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// An optimistic write lost against a concurrent writer.
    #[error("stale write: {0}")]
    StaleWrite(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. duplicate creation).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn item_not_found(code: impl Into<String>) -> Self {
        Self::ItemNotFound(code.into())
    }

    pub fn incomplete_resolution(msg: impl Into<String>) -> Self {
        Self::IncompleteResolution(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn stale_write(msg: impl Into<String>) -> Self {
        Self::StaleWrite(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
