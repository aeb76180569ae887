//! Session errors
//!
//! User-facing variants are expected outcomes of an action and never mutate
//! state. `Configuration` and `Storage` are faults.

use lexis_core::{AssetId, BundleId, Money, ParticipantId, StorageError, StoryId};
use lexis_market::{PricingError, ValidationFailure};
use lexis_storage::CatalogError;
use thiserror::Error;

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Round data is corrupt or missing
    #[error("Configuration fault: {0}")]
    Configuration(String),

    #[error("Insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: Money, available: Money },

    #[error("Already owned: {0}")]
    AlreadyOwned(String),

    #[error("You have already rated story {0}")]
    DuplicateRating(AssetId),

    #[error("{0}")]
    InvalidStoryStructure(ValidationFailure),

    #[error("Unknown bundle: {0}")]
    UnknownBundle(BundleId),

    #[error("Unknown story {story} in bundle {bundle}")]
    UnknownStory { bundle: BundleId, story: StoryId },

    #[error("Unknown asset: {0}")]
    UnknownAsset(AssetId),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// The target exists but is not another participant's submitted creation
    #[error("Story {0} is not open for rating")]
    NotRateable(AssetId),

    #[error("Already owns all vocabularies")]
    NothingToDraw,

    #[error("Please enter story content first")]
    EmptyStory,

    #[error("Scores must be between 1 and 7")]
    InvalidScore,

    #[error("License rate must be at least 1.0, got {0}")]
    InvalidLicenseRate(f64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Whether this is an expected outcome to show the participant rather
    /// than a fault to log
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            SessionError::Configuration(_) | SessionError::Storage(_)
        )
    }
}

impl From<PricingError> for SessionError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::MissingVocab { .. } => SessionError::Configuration(err.to_string()),
            PricingError::UnknownBundle(bundle) => SessionError::UnknownBundle(bundle),
            PricingError::UnknownStory { bundle, story } => {
                SessionError::UnknownStory { bundle, story }
            }
            PricingError::InsufficientBalance {
                required,
                available,
            } => SessionError::InsufficientBalance {
                required,
                available,
            },
        }
    }
}

impl From<CatalogError> for SessionError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Storage(inner) => SessionError::Storage(inner),
            other => SessionError::Configuration(other.to_string()),
        }
    }
}
