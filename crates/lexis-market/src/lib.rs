//! # Lexis Market
//!
//! Pure market rules for the Lexis story experiment.
//!
//! Nothing in this crate performs I/O: every function takes the round catalog
//! and the caller's view of owned vocabulary and returns a value.
//!
//! - [`pricing`]: bundle, content and transfer prices
//! - [`validator`]: the one-word-per-sentence story rule
//! - [`ratings`]: rating aggregation and next-round story generation

pub mod error;
pub mod pricing;
pub mod ratings;
pub mod validator;

pub use error::PricingError;
pub use pricing::{
    BundleQuote, StoryQuote, actual_story_price, bundle_price, ensure_affordable,
    missing_vocab_price, quote_bundle, quote_story, story_content_price, transfer_price,
};
pub use ratings::{
    DEFAULT_LICENSE_RATE, NextRoundStory, RatingSummary, next_round_stories,
    normalize_rater_license_rate, stories_for_rating,
};
pub use validator::{StoryValidation, ValidationFailure, validate_story};
