//! Carry rated submissions into the next round

use lexis_core::{Bundle, BundleId, RoundConfig};
use lexis_market::NextRoundStory;

/// Next round's catalog: the same vocabulary, with one bundle per carried
/// story owned by its creator. System bundles are kept.
pub fn build_next_round(base: &RoundConfig, stories: Vec<NextRoundStory>) -> RoundConfig {
    let mut next = base.clone();
    next.round_number = base.round_number + 1;

    let carried = stories.into_iter().enumerate().map(|(index, carried)| Bundle {
        id: BundleId::new(format!("cu{}", index + 1)),
        owner_tag: carried.creator.to_string(),
        vocab_ids: carried.vocab_ids,
        stories: vec![carried.story],
    });
    next.bundles.extend(carried);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_core::{BundledStory, Money, ParticipantId, StoryId, VocabEntry, VocabId};
    use lexis_market::RatingSummary;

    fn base() -> RoundConfig {
        RoundConfig {
            round_number: 1,
            initial_balance: Money::from_major(100),
            draw_price: Money::from_major(10),
            vocabularies: vec![VocabEntry {
                id: VocabId::from("va1"),
                word: "quantum".to_string(),
                price: Money::from_major(10),
                category: "basic".to_string(),
            }],
            bundles: vec![],
        }
    }

    #[test]
    fn test_carried_stories_become_creator_bundles() {
        let story = NextRoundStory {
            story: BundledStory {
                id: StoryId::from("0b9c"),
                content: "A quantum hum.".to_string(),
                rating: 4.0,
                content_license_rate: 1.5,
            },
            creator: ParticipantId::from("alice"),
            vocab_ids: vec![VocabId::from("va1")],
            summary: RatingSummary::from_ratings(std::iter::empty()),
        };

        let next = build_next_round(&base(), vec![story]);
        assert_eq!(next.round_number, 2);
        assert_eq!(next.vocabularies.len(), 1);
        assert_eq!(next.bundles.len(), 1);
        assert_eq!(next.bundles[0].id, BundleId::from("cu1"));
        assert_eq!(next.bundles[0].owner_tag, "alice");
        assert!(next.check_integrity().is_empty());
    }

    #[test]
    fn test_sample_round_is_consistent() {
        let round: RoundConfig =
            serde_json::from_str(include_str!("../rounds/round1.json")).unwrap();
        assert_eq!(round.vocabularies.len(), 10);
        assert_eq!(round.bundles.len(), 5);
        assert_eq!(round.initial_balance, Money::from_major(100));
        assert!(round.check_integrity().is_empty());
    }
}
