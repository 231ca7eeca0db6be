//! Error types for moderation, marketplace and complaint operations
//!
//! Every public operation returns one of these kinds so callers never have to
//! inspect raw chat platform errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::moderation::record::describe_until;
use crate::store::StoreError;

/// Errors that can occur during moderation operations
#[derive(Debug, Error)]
pub enum ModerationError {
    /// The chat platform refused or failed the call
    #[error("Chat action failed: {0}")]
    Gateway(#[from] GatewayError),

    /// User supplied text failed a length or format check
    #[error("{0}")]
    Validation(String),

    /// The action was already performed (duplicate rating, review, publish)
    #[error("Already done: {0}")]
    Conflict(String),

    /// Referenced record does not exist or does not belong to the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller is blocked from this feature
    #[error("Blocked: {reason}, {}", describe_until(.until.as_ref()))]
    Blocked {
        reason: String,
        until: Option<DateTime<Utc>>,
    },

    /// Persisting the store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ModerationError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;

/// Require at least `min` characters of trimmed text
///
/// # Errors
/// Returns [`ModerationError::Validation`] naming the field when the text is too short
pub fn ensure_min_len(value: &str, min: usize, field: &str) -> ModerationResult<()> {
    if value.trim().chars().count() < min {
        return Err(ModerationError::Validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    Ok(())
}
