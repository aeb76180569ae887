//! Rating rules, aggregation and next-round story generation

use std::collections::HashSet;

use lexis_core::{
    Asset, AssetId, AssetStatus, AssetType, BundledStory, ParticipantId, StoryId, StoryRating,
    VocabId,
};
use serde::Serialize;

/// License rate used when none is known or a rater's value is out of range
pub const DEFAULT_LICENSE_RATE: f64 = 1.5;

/// Accepted range for a rater-chosen license rate
pub const RATER_LICENSE_RATE_RANGE: std::ops::RangeInclusive<f64> = 1.0..=3.0;

/// Display rating given to next-round stories nobody rated
pub const UNRATED_STORY_RATING: f64 = 4.0;

/// Replace an out-of-range rater license rate with the default
pub fn normalize_rater_license_rate(rate: f64) -> f64 {
    if RATER_LICENSE_RATE_RANGE.contains(&rate) {
        rate
    } else {
        DEFAULT_LICENSE_RATE
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Averages over every rating of one story, rounded to two digits
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    pub creativity_avg: f64,
    pub coherence_avg: f64,
    pub overall_avg: f64,
    pub license_rate_avg: f64,
    pub rating_count: usize,
}

impl RatingSummary {
    pub fn from_ratings<'a>(ratings: impl IntoIterator<Item = &'a StoryRating>) -> Self {
        let mut count = 0usize;
        let (mut creativity, mut coherence, mut overall, mut rate) = (0u32, 0u32, 0u32, 0.0f64);
        for rating in ratings {
            count += 1;
            creativity += u32::from(rating.scores.creativity);
            coherence += u32::from(rating.scores.coherence);
            overall += u32::from(rating.scores.overall);
            rate += rating.license_rate_set_by_rater;
        }

        if count == 0 {
            return Self {
                creativity_avg: 0.0,
                coherence_avg: 0.0,
                overall_avg: 0.0,
                license_rate_avg: DEFAULT_LICENSE_RATE,
                rating_count: 0,
            };
        }

        let n = count as f64;
        Self {
            creativity_avg: round2(f64::from(creativity) / n),
            coherence_avg: round2(f64::from(coherence) / n),
            overall_avg: round2(f64::from(overall) / n),
            license_rate_avg: round2(rate / n),
            rating_count: count,
        }
    }
}

/// A submitted story carried into the next round as bundled content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextRoundStory {
    pub story: BundledStory,
    pub creator: ParticipantId,
    pub vocab_ids: Vec<VocabId>,
    pub summary: RatingSummary,
}

fn is_rateable(asset: &Asset) -> bool {
    asset.asset_type == AssetType::UserCreation && asset.status == AssetStatus::Submitted
}

/// Build next-round stories from submitted creations.
///
/// Stories nobody rated get rating 4.0 and license rate 1.5. Inactive or
/// unsubmitted creations are skipped.
pub fn next_round_stories(creations: &[Asset], ratings: &[StoryRating]) -> Vec<NextRoundStory> {
    creations
        .iter()
        .filter(|a| is_rateable(a))
        .map(|creation| {
            let summary = RatingSummary::from_ratings(
                ratings
                    .iter()
                    .filter(|r| r.target_asset_id == creation.asset_id),
            );
            let rating = if summary.rating_count == 0 {
                UNRATED_STORY_RATING
            } else {
                summary.overall_avg
            };
            let license_rate = if summary.rating_count == 0 {
                DEFAULT_LICENSE_RATE
            } else {
                summary.license_rate_avg
            };
            NextRoundStory {
                story: BundledStory {
                    id: StoryId::new(creation.asset_id.to_string()),
                    content: creation.content_str().to_string(),
                    rating,
                    content_license_rate: license_rate,
                },
                creator: creation.participant_id.clone(),
                vocab_ids: creation.vocab_ids().cloned().collect(),
                summary,
            }
        })
        .collect()
}

/// Submitted creations by other participants that `rater` has not rated yet
pub fn stories_for_rating<'a>(
    rater: &ParticipantId,
    creations: &'a [Asset],
    existing: &[StoryRating],
) -> Vec<&'a Asset> {
    let rated: HashSet<&AssetId> = existing
        .iter()
        .filter(|r| &r.rater == rater)
        .map(|r| &r.target_asset_id)
        .collect();
    creations
        .iter()
        .filter(|a| is_rateable(a))
        .filter(|a| &a.participant_id != rater)
        .filter(|a| !rated.contains(&a.asset_id))
        .collect()
}
