//! Story ratings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssetId, ParticipantId, RatingId};

/// Lowest accepted score
pub const MIN_SCORE: u8 = 1;
/// Highest accepted score
pub const MAX_SCORE: u8 = 7;

/// The three scores a rater assigns to a story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingScores {
    pub creativity: u8,
    pub coherence: u8,
    pub overall: u8,
}

impl RatingScores {
    /// Build scores, returning `None` when any score is outside 1..=7
    pub fn new(creativity: u8, coherence: u8, overall: u8) -> Option<Self> {
        let scores = Self {
            creativity,
            coherence,
            overall,
        };
        scores.is_valid().then_some(scores)
    }

    pub fn is_valid(&self) -> bool {
        [self.creativity, self.coherence, self.overall]
            .iter()
            .all(|s| (MIN_SCORE..=MAX_SCORE).contains(s))
    }
}

/// One rater's assessment of one submitted story.
///
/// At most one exists per `(rater, target_asset_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRating {
    pub rating_id: RatingId,
    pub rater: ParticipantId,
    pub target_asset_id: AssetId,
    #[serde(flatten)]
    pub scores: RatingScores,
    pub license_rate_set_by_rater: f64,
    pub original_license_rate: Option<f64>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoryRating {
    pub fn new(
        rater: ParticipantId,
        target_asset_id: AssetId,
        scores: RatingScores,
        license_rate_set_by_rater: f64,
    ) -> Self {
        Self {
            rating_id: RatingId::generate(),
            rater,
            target_asset_id,
            scores,
            license_rate_set_by_rater,
            original_license_rate: None,
            comment: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_original_rate(mut self, rate: Option<f64>) -> Self {
        self.original_license_rate = rate;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
