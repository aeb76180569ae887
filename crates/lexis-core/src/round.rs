//! Round configuration: the immutable catalog a round is played against

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{BundleId, StoryId, VocabId};
use crate::money::Money;

/// Owner tag used for bundles created by the experiment itself
pub const SYSTEM_OWNER: &str = "system";

/// Price of a random word draw when the round does not set one
pub fn default_draw_price() -> Money {
    Money::from_major(10)
}

fn default_owner_tag() -> String {
    SYSTEM_OWNER.to_string()
}

/// A purchasable word or phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub id: VocabId,
    /// Word or multi-word phrase
    pub word: String,
    pub price: Money,
    /// Informational tag ("basic", "premium", ...)
    #[serde(default)]
    pub category: String,
}

/// A pre-written story sold together with a bundle's vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundledStory {
    pub id: StoryId,
    pub content: String,
    /// Display-only score, used for sort order
    #[serde(default)]
    pub rating: f64,
    /// Multiplier (>= 1.0) on the bundle price that sets the content markup
    #[serde(alias = "content_ip_rate")]
    pub content_license_rate: f64,
}

/// A fixed set of words offered together, with optional story content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    /// "system" or the creating participant's id
    #[serde(default = "default_owner_tag", alias = "owner")]
    pub owner_tag: String,
    pub vocab_ids: Vec<VocabId>,
    /// Canonical order; never reordered in place
    #[serde(default)]
    pub stories: Vec<BundledStory>,
}

impl Bundle {
    /// Look up a story by id
    pub fn story(&self, id: &StoryId) -> Option<&BundledStory> {
        self.stories.iter().find(|s| &s.id == id)
    }

    /// Stories in display order: highest rating first, ties keep
    /// canonical order. Derived on every call, never stored.
    pub fn stories_by_rating(&self) -> Vec<&BundledStory> {
        let mut stories: Vec<&BundledStory> = self.stories.iter().collect();
        stories.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        stories
    }

    /// Vocabulary ids in sorted order (the bundle's identity for dedup)
    pub fn sorted_vocab_ids(&self) -> Vec<VocabId> {
        let mut ids = self.vocab_ids.clone();
        ids.sort();
        ids
    }
}

/// Immutable configuration of one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundConfig {
    pub round_number: u32,
    pub initial_balance: Money,
    #[serde(default = "default_draw_price")]
    pub draw_price: Money,
    pub vocabularies: Vec<VocabEntry>,
    #[serde(alias = "combinations")]
    pub bundles: Vec<Bundle>,
}

impl RoundConfig {
    /// Look up a vocabulary entry
    pub fn vocab(&self, id: &VocabId) -> Option<&VocabEntry> {
        self.vocabularies.iter().find(|v| &v.id == id)
    }

    /// Look up a bundle
    pub fn bundle(&self, id: &BundleId) -> Option<&Bundle> {
        self.bundles.iter().find(|b| &b.id == id)
    }

    /// Words for the given ids, in catalog order. Unknown ids are skipped.
    pub fn words_for<'a>(&'a self, ids: impl IntoIterator<Item = &'a VocabId>) -> Vec<String> {
        let wanted: HashSet<&VocabId> = ids.into_iter().collect();
        self.vocabularies
            .iter()
            .filter(|v| wanted.contains(&v.id))
            .map(|v| v.word.clone())
            .collect()
    }

    /// Check referential integrity of the catalog.
    ///
    /// Returns every fault found; an empty vector means the round is usable.
    pub fn check_integrity(&self) -> Vec<ConfigFault> {
        let mut faults = Vec::new();

        let mut seen_vocab = HashSet::new();
        for vocab in &self.vocabularies {
            if !seen_vocab.insert(&vocab.id) {
                faults.push(ConfigFault::DuplicateVocab(vocab.id.clone()));
            }
            if vocab.price.is_negative() {
                faults.push(ConfigFault::NegativePrice(vocab.id.clone()));
            }
        }

        let mut seen_bundles = HashSet::new();
        for bundle in &self.bundles {
            if !seen_bundles.insert(&bundle.id) {
                faults.push(ConfigFault::DuplicateBundle(bundle.id.clone()));
            }
            if bundle.vocab_ids.is_empty() {
                faults.push(ConfigFault::EmptyBundle(bundle.id.clone()));
            }
            for vocab_id in &bundle.vocab_ids {
                if !seen_vocab.contains(vocab_id) {
                    faults.push(ConfigFault::DanglingVocab {
                        bundle: bundle.id.clone(),
                        vocab: vocab_id.clone(),
                    });
                }
            }
            let mut seen_stories = HashSet::new();
            for story in &bundle.stories {
                if !seen_stories.insert(&story.id) {
                    faults.push(ConfigFault::DuplicateStory {
                        bundle: bundle.id.clone(),
                        story: story.id.clone(),
                    });
                }
                if !(story.content_license_rate >= 1.0) {
                    faults.push(ConfigFault::LicenseRateBelowOne {
                        bundle: bundle.id.clone(),
                        story: story.id.clone(),
                        rate: story.content_license_rate,
                    });
                }
            }
        }

        faults
    }

    /// Whether a fault list contains anything that makes pricing impossible.
    ///
    /// A license rate below one is priced as zero markup and only logged.
    pub fn is_fatal(faults: &[ConfigFault]) -> bool {
        faults
            .iter()
            .any(|f| !matches!(f, ConfigFault::LicenseRateBelowOne { .. }))
    }
}

/// A configuration-integrity problem in a round catalog
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigFault {
    DuplicateVocab(VocabId),
    NegativePrice(VocabId),
    DuplicateBundle(BundleId),
    EmptyBundle(BundleId),
    DanglingVocab { bundle: BundleId, vocab: VocabId },
    DuplicateStory { bundle: BundleId, story: StoryId },
    LicenseRateBelowOne { bundle: BundleId, story: StoryId, rate: f64 },
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFault::DuplicateVocab(id) => write!(f, "duplicate vocabulary id {id}"),
            ConfigFault::NegativePrice(id) => write!(f, "negative price for vocabulary {id}"),
            ConfigFault::DuplicateBundle(id) => write!(f, "duplicate bundle id {id}"),
            ConfigFault::EmptyBundle(id) => write!(f, "bundle {id} has no vocabulary"),
            ConfigFault::DanglingVocab { bundle, vocab } => {
                write!(f, "bundle {bundle} references unknown vocabulary {vocab}")
            }
            ConfigFault::DuplicateStory { bundle, story } => {
                write!(f, "bundle {bundle} has duplicate story id {story}")
            }
            ConfigFault::LicenseRateBelowOne { bundle, story, rate } => {
                write!(f, "story {story} in bundle {bundle} has license rate {rate} below 1.0")
            }
        }
    }
}
