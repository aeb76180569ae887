//! Pricing errors

use lexis_core::{BundleId, Money, StoryId, VocabId};
use thiserror::Error;

/// Errors raised while pricing a purchase
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    /// A bundle references vocabulary the round does not define
    #[error("Bundle {bundle} references unknown vocabulary {vocab}")]
    MissingVocab { bundle: BundleId, vocab: VocabId },

    /// No bundle with this id in the round
    #[error("Unknown bundle: {0}")]
    UnknownBundle(BundleId),

    /// No story with this id in the bundle
    #[error("Unknown story {story} in bundle {bundle}")]
    UnknownStory { bundle: BundleId, story: StoryId },

    /// The price exceeds the available balance
    #[error("Insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: Money, available: Money },
}

impl PricingError {
    /// Whether the error means the round data itself is corrupt
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, PricingError::MissingVocab { .. })
    }
}
