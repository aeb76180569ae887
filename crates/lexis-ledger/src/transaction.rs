//! Ledger transactions and their dedup keys

use chrono::{DateTime, Utc};
use lexis_core::{
    Asset, AssetMetadata, AssetStatus, AssetType, BundleId, Money, NewAsset, ParticipantId,
    StoryId, VocabId,
};
use serde::Serialize;

/// Draw method recorded on random word draws
pub const DRAW_METHOD_RANDOM: &str = "random";

/// One economic action, carrying everything needed to build its asset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transaction {
    PurchaseBundle {
        bundle_id: BundleId,
        vocab_ids: Vec<VocabId>,
        price: Money,
    },
    PurchaseStoryContent {
        bundle_id: BundleId,
        story_id: StoryId,
        content: String,
        vocab_ids: Vec<VocabId>,
        price: Money,
        content_price: Money,
        license_rate: f64,
        rating: f64,
    },
    DrawWord {
        vocab_id: VocabId,
        word: String,
        price: Money,
    },
    SubmitStory {
        content: String,
        vocab_ids: Vec<VocabId>,
        license_rate: f64,
        created_at: DateTime<Utc>,
    },
    SaveDraft {
        content: String,
        vocab_ids: Vec<VocabId>,
        created_at: DateTime<Utc>,
    },
}

impl Transaction {
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::PurchaseBundle { .. } => "purchase_bundle",
            Transaction::PurchaseStoryContent { .. } => "purchase_story_content",
            Transaction::DrawWord { .. } => "draw_word",
            Transaction::SubmitStory { .. } => "submit_story",
            Transaction::SaveDraft { .. } => "save_draft",
        }
    }

    /// Amount charged to the participant
    pub fn price(&self) -> Money {
        match self {
            Transaction::PurchaseBundle { price, .. }
            | Transaction::PurchaseStoryContent { price, .. }
            | Transaction::DrawWord { price, .. } => *price,
            Transaction::SubmitStory { .. } | Transaction::SaveDraft { .. } => Money::ZERO,
        }
    }

    /// Key identifying an already-persisted effect; drafts have none
    pub fn dedup_key(&self) -> Option<DedupKey> {
        match self {
            Transaction::PurchaseBundle { vocab_ids, .. } => {
                Some(DedupKey::Bundle(sorted(vocab_ids.iter().cloned())))
            }
            Transaction::PurchaseStoryContent { content, .. } => {
                Some(DedupKey::StoryContent(content.clone()))
            }
            Transaction::DrawWord { vocab_id, .. } => Some(DedupKey::Draw(vocab_id.clone())),
            Transaction::SubmitStory { content, .. } => Some(DedupKey::Creation(content.clone())),
            Transaction::SaveDraft { .. } => None,
        }
    }

    /// The asset this transaction persists
    pub fn to_new_asset(&self, participant: &ParticipantId, round: u32) -> NewAsset {
        let base = |kind| NewAsset::new(participant.clone(), round, kind);
        match self {
            Transaction::PurchaseBundle {
                bundle_id,
                vocab_ids,
                price,
            } => base(AssetType::Vocabulary)
                .with_vocab_ids(vocab_ids)
                .with_metadata(AssetMetadata {
                    combo_id: Some(bundle_id.clone()),
                    price_paid: Some(*price),
                    ..Default::default()
                }),
            Transaction::PurchaseStoryContent {
                bundle_id,
                story_id,
                content,
                vocab_ids,
                price,
                content_price,
                license_rate,
                rating,
            } => base(AssetType::StoryTemplate)
                .with_content(content.clone())
                .with_vocab_ids(vocab_ids)
                .with_license_rate(Some(*license_rate))
                .with_metadata(AssetMetadata {
                    story_id: Some(story_id.clone()),
                    combo_id: Some(bundle_id.clone()),
                    price_paid: Some(*price),
                    content_price: Some(*content_price),
                    content_ip_rate: Some(*license_rate),
                    rating: Some(*rating),
                    ..Default::default()
                }),
            Transaction::DrawWord {
                vocab_id,
                word,
                price,
            } => base(AssetType::VocabularyDraw)
                .with_content(format!("Drawn vocabulary: {word}"))
                .with_vocab_ids([vocab_id])
                .with_metadata(AssetMetadata {
                    price_paid: Some(*price),
                    draw_method: Some(DRAW_METHOD_RANDOM.to_string()),
                    ..Default::default()
                }),
            Transaction::SubmitStory {
                content,
                vocab_ids,
                license_rate,
                created_at,
            } => base(AssetType::UserCreation)
                .with_content(content.clone())
                .with_vocab_ids(vocab_ids)
                .with_license_rate(Some(*license_rate))
                .with_status(AssetStatus::Submitted)
                .with_metadata(AssetMetadata {
                    created_at: Some(*created_at),
                    word_count: Some(word_count(content)),
                    content_ip_rate: Some(*license_rate),
                    ..Default::default()
                }),
            Transaction::SaveDraft {
                content,
                vocab_ids,
                created_at,
            } => base(AssetType::StoryDraft)
                .with_content(content.clone())
                .with_vocab_ids(vocab_ids)
                .with_metadata(AssetMetadata {
                    created_at: Some(*created_at),
                    word_count: Some(word_count(content)),
                    is_draft: Some(true),
                    ..Default::default()
                }),
        }
    }
}

/// Whitespace-separated word count
pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

fn sorted(ids: impl Iterator<Item = VocabId>) -> Vec<VocabId> {
    let mut ids: Vec<VocabId> = ids.collect();
    ids.sort();
    ids
}

/// Deterministic identity of a persisted effect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Sorted vocab ids, matched against `vocabulary` assets
    Bundle(Vec<VocabId>),
    /// Exact content, matched against `story_template` assets
    StoryContent(String),
    /// Drawn vocab id, matched against `vocabulary_draw` assets
    Draw(VocabId),
    /// Exact content, matched against live `user_creation` assets
    Creation(String),
}

impl DedupKey {
    /// The key an already-persisted asset occupies, if any
    pub fn for_asset(asset: &Asset) -> Option<DedupKey> {
        match asset.asset_type {
            AssetType::Vocabulary => Some(DedupKey::Bundle(sorted(asset.vocab_ids().cloned()))),
            AssetType::StoryTemplate => {
                Some(DedupKey::StoryContent(asset.content_str().to_string()))
            }
            AssetType::VocabularyDraw => asset.vocab_ids().next().cloned().map(DedupKey::Draw),
            AssetType::UserCreation if asset.status != AssetStatus::Inactive => {
                Some(DedupKey::Creation(asset.content_str().to_string()))
            }
            AssetType::UserCreation | AssetType::StoryDraft => None,
        }
    }
}

/// A queued transaction with its append sequence number
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub transaction: Transaction,
}
