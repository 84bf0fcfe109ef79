//! Error types for the campaign lifecycle domain.

use promo_core::CampaignId;

/// The result type used throughout promo-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in campaign lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A campaign was not found.
    #[error("campaign not found: {campaign_id}")]
    CampaignNotFound {
        /// The campaign ID that was not found.
        campaign_id: CampaignId,
    },

    /// An occurrence row was not found.
    #[error("occurrence not found: {occurrence_id}")]
    OccurrenceNotFound {
        /// The occurrence ID that was not found.
        occurrence_id: promo_core::OccurrenceId,
    },

    /// An invalid status transition was attempted.
    #[error("invalid status transition: {from} -> {to} ({reason})")]
    InvalidStatusTransition {
        /// The current status.
        from: String,
        /// The attempted target status.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// Campaign data failed validation before any mutation.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// An authoring timezone string could not be parsed.
    #[error("invalid timezone: {timezone}")]
    InvalidTimezone {
        /// The offending timezone string.
        timezone: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from promo-core.
    #[error("core error: {0}")]
    Core(#[from] promo_core::Error),
}

impl Error {
    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid-transition error naming the disallowed pair.
    #[must_use]
    pub fn invalid_transition(
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}
