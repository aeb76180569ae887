//! Persisted assets: the durable record of every economic action

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssetId, BundleId, ParticipantId, StoryId, VocabId};
use crate::money::Money;

/// Kind of asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// A purchased vocabulary bundle
    Vocabulary,
    /// Purchased pre-written story content
    StoryTemplate,
    /// A randomly drawn word
    VocabularyDraw,
    /// An in-progress story snapshot
    StoryDraft,
    /// A finalized, submitted story
    UserCreation,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Vocabulary => "vocabulary",
            AssetType::StoryTemplate => "story_template",
            AssetType::VocabularyDraw => "vocabulary_draw",
            AssetType::StoryDraft => "story_draft",
            AssetType::UserCreation => "user_creation",
        }
    }

    /// Whether assets of this type grant ownership of their vocabulary
    pub fn grants_vocabulary(&self) -> bool {
        matches!(
            self,
            AssetType::Vocabulary | AssetType::StoryTemplate | AssetType::VocabularyDraw
        )
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    Active,
    Archived,
    Submitted,
    Approved,
    Rejected,
    /// Superseded; kept for audit history
    Inactive,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Active => "active",
            AssetStatus::Archived => "archived",
            AssetStatus::Submitted => "submitted",
            AssetStatus::Approved => "approved",
            AssetStatus::Rejected => "rejected",
            AssetStatus::Inactive => "inactive",
        }
    }

    /// Active or submitted
    pub fn is_live(&self) -> bool {
        matches!(self, AssetStatus::Active | AssetStatus::Submitted)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known metadata written alongside an asset.
///
/// Key names are a storage contract read by display code and must stay
/// stable. Unknown keys survive a round trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_paid: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ip_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combo_id: Option<BundleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<StoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_draft: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferred_from: Option<ParticipantId>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AssetMetadata {
    /// Render as the JSON object written to storage
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }

    /// Parse a stored JSON object
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Everything needed to create an asset; the store assigns id and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub participant_id: ParticipantId,
    pub round_id: u32,
    pub asset_type: AssetType,
    pub content: Option<String>,
    pub used_vocab_ids: Option<BTreeSet<VocabId>>,
    pub metadata: AssetMetadata,
    pub content_license_rate: Option<f64>,
    pub status: AssetStatus,
}

impl NewAsset {
    pub fn new(participant_id: ParticipantId, round_id: u32, asset_type: AssetType) -> Self {
        Self {
            participant_id,
            round_id,
            asset_type,
            content: None,
            used_vocab_ids: None,
            metadata: AssetMetadata::default(),
            content_license_rate: None,
            status: AssetStatus::Active,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_vocab_ids<'a>(mut self, ids: impl IntoIterator<Item = &'a VocabId>) -> Self {
        let ids: BTreeSet<VocabId> = ids.into_iter().cloned().collect();
        self.used_vocab_ids = (!ids.is_empty()).then_some(ids);
        self
    }

    pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_license_rate(mut self, rate: Option<f64>) -> Self {
        self.content_license_rate = rate;
        self
    }

    pub fn with_status(mut self, status: AssetStatus) -> Self {
        self.status = status;
        self
    }
}

/// A persisted asset. Never deleted, only status-transitioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: AssetId,
    pub participant_id: ParticipantId,
    pub round_id: u32,
    pub asset_type: AssetType,
    pub content: Option<String>,
    pub status: AssetStatus,
    pub score: Option<i32>,
    pub content_license_rate: Option<f64>,
    pub used_vocab_ids: Option<BTreeSet<VocabId>>,
    pub metadata: AssetMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Materialize a new asset with a freshly generated id
    pub fn from_new(new: NewAsset, now: DateTime<Utc>) -> Self {
        Self {
            asset_id: AssetId::generate(),
            participant_id: new.participant_id,
            round_id: new.round_id,
            asset_type: new.asset_type,
            content: new.content,
            status: new.status,
            score: None,
            content_license_rate: new.content_license_rate,
            used_vocab_ids: new.used_vocab_ids,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Vocabulary ids recorded on the asset (empty when none)
    pub fn vocab_ids(&self) -> impl Iterator<Item = &VocabId> {
        self.used_vocab_ids.iter().flatten()
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_metadata_uses_stable_keys() {
        let metadata = AssetMetadata {
            price_paid: Some(Money::new(dec!(30))),
            content_price: Some(Money::new(dec!(10.00))),
            content_ip_rate: Some(1.5),
            story_id: Some(StoryId::from("sa1")),
            ..Default::default()
        };
        let json = metadata.to_json();
        assert_eq!(json["price_paid"], "30");
        assert_eq!(json["content_price"], "10.00");
        assert_eq!(json["content_ip_rate"], 1.5);
        assert_eq!(json["story_id"], "sa1");
        assert!(json.get("combo_id").is_none());
    }

    #[test]
    fn test_metadata_preserves_unknown_keys() {
        let json = serde_json::json!({
            "price_paid": "10.00",
            "draw_method": "random",
            "legacy_flag": true
        });
        let metadata = AssetMetadata::from_json(json).unwrap();
        assert_eq!(metadata.draw_method.as_deref(), Some("random"));
        assert_eq!(metadata.extra.get("legacy_flag"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(metadata.to_json()["legacy_flag"], true);
    }

    #[test]
    fn test_empty_vocab_set_is_none() {
        let new = NewAsset::new(ParticipantId::from("a1"), 1, AssetType::StoryDraft)
            .with_vocab_ids(std::iter::empty());
        assert!(new.used_vocab_ids.is_none());
    }

    #[test]
    fn test_asset_type_wire_names() {
        let json = serde_json::to_string(&AssetType::StoryTemplate).unwrap();
        assert_eq!(json, "\"story_template\"");
        assert_eq!(AssetType::UserCreation.to_string(), "user_creation");
        assert!(AssetType::VocabularyDraw.grants_vocabulary());
        assert!(!AssetType::StoryDraft.grants_vocabulary());
    }
}
