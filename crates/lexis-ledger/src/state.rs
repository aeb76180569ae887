//! Optimistic per-participant state
//!
//! Mutated immediately when a transaction is accepted, ahead of the flush.

use std::collections::HashSet;
use std::time::Duration;

use lexis_core::{Asset, AssetStatus, AssetType, Money, Participant, ParticipantId, VocabId};
use tokio::time::Instant;

use crate::ledger::Ledger;
use crate::transaction::Transaction;

/// Local view of one participant in one round
#[derive(Debug)]
pub struct ParticipantState {
    pub participant_id: ParticipantId,
    pub round: u32,
    pub balance: Money,
    pub owned_vocab: HashSet<VocabId>,
    /// Exact contents of purchased stories
    pub owned_story_contents: HashSet<String>,
    pub ledger: Ledger,
    /// Current draft text
    pub draft: String,
    /// Draft edited since it was last staged
    pub draft_dirty: bool,
    /// Bumped on every balance change
    pub balance_version: u64,
    /// Version last written to the participant repository
    pub synced_balance_version: u64,
    pub last_activity: Instant,
    pub consecutive_failures: u32,
    pub last_sync: Option<Instant>,
}

impl ParticipantState {
    /// Rebuild from the durable record and the participant's assets
    /// (newest first)
    pub fn rebuild(participant: &Participant, round: u32, assets: &[Asset]) -> Self {
        let in_round = || assets.iter().filter(move |a| a.round_id == round);

        let owned_vocab = in_round()
            .filter(|a| a.asset_type.grants_vocabulary())
            .flat_map(|a| a.vocab_ids().cloned())
            .collect();
        let owned_story_contents = in_round()
            .filter(|a| a.asset_type == AssetType::StoryTemplate)
            .map(|a| a.content_str().to_string())
            .collect();
        let draft = in_round()
            .find(|a| a.asset_type == AssetType::StoryDraft && a.status != AssetStatus::Inactive)
            .map(|a| a.content_str().to_string())
            .unwrap_or_default();

        Self {
            participant_id: participant.id.clone(),
            round,
            balance: participant.balance,
            owned_vocab,
            owned_story_contents,
            ledger: Ledger::new(),
            draft,
            draft_dirty: false,
            balance_version: 0,
            synced_balance_version: 0,
            last_activity: Instant::now(),
            consecutive_failures: 0,
            last_sync: None,
        }
    }

    /// Apply an accepted transaction and queue it. Returns its sequence number.
    pub fn apply(&mut self, transaction: Transaction) -> u64 {
        let price = transaction.price();
        if !price.is_zero() {
            self.balance = (self.balance - price).rounded();
            self.balance_version += 1;
        }

        match &transaction {
            Transaction::PurchaseBundle { vocab_ids, .. } => {
                self.owned_vocab.extend(vocab_ids.iter().cloned());
            }
            Transaction::PurchaseStoryContent {
                vocab_ids, content, ..
            } => {
                self.owned_vocab.extend(vocab_ids.iter().cloned());
                self.owned_story_contents.insert(content.clone());
            }
            Transaction::DrawWord { vocab_id, .. } => {
                self.owned_vocab.insert(vocab_id.clone());
            }
            Transaction::SubmitStory { .. } => {
                self.draft.clear();
                self.draft_dirty = false;
            }
            Transaction::SaveDraft { content, .. } => {
                self.draft = content.clone();
                self.draft_dirty = false;
            }
        }

        self.touch();
        self.ledger.append(transaction)
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Anything a flush would write
    pub fn has_pending_work(&self) -> bool {
        !self.ledger.is_empty()
            || self.draft_dirty
            || self.balance_version != self.synced_balance_version
    }

    /// Owned vocab ids in sorted order
    pub fn sorted_vocab(&self) -> Vec<VocabId> {
        let mut ids: Vec<VocabId> = self.owned_vocab.iter().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexis_core::{BundleId, NewAsset};

    fn asset(kind: AssetType, round: u32, content: &str, vocab: &[&str]) -> Asset {
        let ids: Vec<VocabId> = vocab.iter().map(|v| VocabId::from(*v)).collect();
        let new = NewAsset::new(ParticipantId::from("a1"), round, kind)
            .with_content(content)
            .with_vocab_ids(&ids);
        Asset::from_new(new, Utc::now())
    }

    #[test]
    fn test_rebuild_from_assets() {
        let participant = Participant::new(ParticipantId::from("a1"), 1, Money::from_major(80));
        let mut old_draft = asset(AssetType::StoryDraft, 1, "old", &[]);
        old_draft.status = AssetStatus::Inactive;
        // Newest first
        let assets = vec![
            asset(AssetType::StoryDraft, 1, "latest", &[]),
            old_draft,
            asset(AssetType::StoryTemplate, 1, "A story.", &["va3"]),
            asset(AssetType::Vocabulary, 1, "", &["va1", "va2"]),
            asset(AssetType::Vocabulary, 2, "", &["va9"]),
            asset(AssetType::UserCreation, 1, "Mine.", &["va4"]),
        ];

        let state = ParticipantState::rebuild(&participant, 1, &assets);
        assert_eq!(state.balance, Money::from_major(80));
        assert_eq!(
            state.sorted_vocab(),
            vec![VocabId::from("va1"), VocabId::from("va2"), VocabId::from("va3")]
        );
        assert!(state.owned_story_contents.contains("A story."));
        assert_eq!(state.draft, "latest");
        assert!(!state.has_pending_work());
    }

    #[test]
    fn test_apply_debits_and_grants() {
        let participant = Participant::new(ParticipantId::from("a1"), 1, Money::from_major(100));
        let mut state = ParticipantState::rebuild(&participant, 1, &[]);

        let seq = state.apply(Transaction::PurchaseBundle {
            bundle_id: BundleId::from("ca1"),
            vocab_ids: vec![VocabId::from("va1"), VocabId::from("va2")],
            price: Money::from_major(20),
        });
        assert_eq!(seq, 0);
        assert_eq!(state.balance, Money::from_major(80));
        assert_eq!(state.owned_vocab.len(), 2);
        assert_eq!(state.ledger.len(), 1);
        assert!(state.has_pending_work());

        state.draft = "half written".into();
        state.draft_dirty = true;
        state.apply(Transaction::SubmitStory {
            content: "Done.".into(),
            vocab_ids: vec![],
            license_rate: 1.5,
            created_at: Utc::now(),
        });
        assert!(state.draft.is_empty());
        assert!(!state.draft_dirty);
        assert_eq!(state.balance_version, 1);
    }
}
