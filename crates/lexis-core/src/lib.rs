//! # Lexis Core
//!
//! Core types, errors, and storage traits for the Lexis story market.
//!
//! Participants buy vocabulary and story content with a virtual currency,
//! write stories under a one-word-per-sentence rule, and rate each other's
//! submissions. This crate holds the vocabulary shared by every other crate
//! in the workspace.
//!
//! ## Key Types
//!
//! - [`Money`]: Fixed two-digit decimal currency amount
//! - [`RoundConfig`]: Immutable per-round catalog (vocabulary, bundles, stories)
//! - [`Asset`]: One persisted purchase, draw, draft, or submission
//! - [`Participant`]: Durable participant record holding the balance
//! - [`StoryRating`]: One rater's scores for one submitted story
//!
//! ## Key Traits
//!
//! - [`AssetStore`]: Asset creation, status transition, and lookup
//! - [`ParticipantRepository`]: Participant lookup and balance writes
//! - [`RatingStore`]: Duplicate-rejecting rating persistence
//! - [`TransferStore`]: All-or-nothing story transfer between participants
//! - [`RoundConfigSource`]: Append-only round configuration storage

pub mod asset;
pub mod error;
pub mod ids;
pub mod money;
pub mod participant;
pub mod rating;
pub mod round;
pub mod traits;

pub use asset::*;
pub use error::*;
pub use ids::*;
pub use money::*;
pub use participant::*;
pub use rating::*;
pub use round::*;
pub use traits::*;
