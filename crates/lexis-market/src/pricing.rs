//! Pricing engine
//!
//! Prices are computed at full decimal precision and rounded to two digits
//! only when a quote is produced.

use std::collections::HashSet;

use lexis_core::{Bundle, BundleId, BundledStory, Money, RoundConfig, StoryId, VocabId, decimal_from_f64};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PricingError;

/// Sum of the prices of every vocabulary entry the bundle references.
///
/// A reference the round does not define is a configuration fault.
pub fn bundle_price(bundle: &Bundle, catalog: &RoundConfig) -> Result<Money, PricingError> {
    bundle
        .vocab_ids
        .iter()
        .map(|id| vocab_price(bundle, id, catalog))
        .sum()
}

/// Content markup of a bundled story: `bundle_price × (rate − 1)`.
///
/// A rate below 1.0 (or not a number) is priced as zero and logged.
pub fn story_content_price(story: &BundledStory, bundle_price: Money) -> Money {
    markup(bundle_price, story.content_license_rate, story.id.as_str())
}

/// Sum of the prices of bundle words not in `owned`
pub fn missing_vocab_price(
    bundle: &Bundle,
    owned: &HashSet<VocabId>,
    catalog: &RoundConfig,
) -> Result<Money, PricingError> {
    bundle
        .vocab_ids
        .iter()
        .filter(|id| !owned.contains(*id))
        .map(|id| vocab_price(bundle, id, catalog))
        .sum()
}

/// Price actually charged for a story: content only when every word is
/// already owned, otherwise content plus the missing words.
pub fn actual_story_price(content_price: Money, missing_vocab_price: Money) -> Money {
    if missing_vocab_price.is_zero() {
        content_price
    } else {
        content_price + missing_vocab_price
    }
}

/// Fail unless `price` fits in `balance`
pub fn ensure_affordable(price: Money, balance: Money) -> Result<(), PricingError> {
    if price <= balance {
        Ok(())
    } else {
        Err(PricingError::InsufficientBalance {
            required: price,
            available: balance,
        })
    }
}

/// Content markup paid when one participant's story content is passed to
/// another. Vocabulary is not charged.
pub fn transfer_price(
    vocab_ids: &[VocabId],
    license_rate: f64,
    catalog: &RoundConfig,
) -> Money {
    // Unknown ids contribute nothing
    let total: Money = vocab_ids
        .iter()
        .filter_map(|id| catalog.vocab(id))
        .map(|v| v.price)
        .sum();
    markup(total, license_rate, "transfer").rounded()
}

/// Price breakdown for buying a bundle's vocabulary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleQuote {
    pub bundle_id: BundleId,
    /// Amount charged, rounded
    pub price: Money,
    /// Words in the bundle the participant does not own yet
    pub missing: Vec<VocabId>,
}

impl BundleQuote {
    /// Every word is already owned; buying again is refused
    pub fn all_owned(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Price breakdown for buying a bundled story
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryQuote {
    pub bundle_id: BundleId,
    pub story_id: StoryId,
    pub bundle_price: Money,
    pub content_price: Money,
    pub missing_vocab_price: Money,
    /// Amount charged, rounded
    pub price: Money,
    pub license_rate: f64,
    pub rating: f64,
}

/// Quote a bundle purchase. The full bundle price is charged.
pub fn quote_bundle(
    bundle_id: &BundleId,
    owned: &HashSet<VocabId>,
    catalog: &RoundConfig,
) -> Result<BundleQuote, PricingError> {
    let bundle = catalog
        .bundle(bundle_id)
        .ok_or_else(|| PricingError::UnknownBundle(bundle_id.clone()))?;
    let price = bundle_price(bundle, catalog)?.rounded();
    let missing = bundle
        .vocab_ids
        .iter()
        .filter(|id| !owned.contains(*id))
        .cloned()
        .collect();
    debug!(bundle = %bundle_id, %price, "quoted bundle");
    Ok(BundleQuote {
        bundle_id: bundle_id.clone(),
        price,
        missing,
    })
}

/// Quote a story purchase given the participant's owned vocabulary
pub fn quote_story(
    bundle_id: &BundleId,
    story_id: &StoryId,
    owned: &HashSet<VocabId>,
    catalog: &RoundConfig,
) -> Result<StoryQuote, PricingError> {
    let bundle = catalog
        .bundle(bundle_id)
        .ok_or_else(|| PricingError::UnknownBundle(bundle_id.clone()))?;
    let story = bundle.story(story_id).ok_or_else(|| PricingError::UnknownStory {
        bundle: bundle_id.clone(),
        story: story_id.clone(),
    })?;

    let full = bundle_price(bundle, catalog)?;
    let content = story_content_price(story, full);
    let missing = missing_vocab_price(bundle, owned, catalog)?;
    let price = actual_story_price(content, missing).rounded();

    debug!(
        bundle = %bundle_id,
        story = %story_id,
        bundle_price = %full,
        content_price = %content,
        missing_vocab_price = %missing,
        %price,
        "quoted story"
    );

    Ok(StoryQuote {
        bundle_id: bundle_id.clone(),
        story_id: story_id.clone(),
        bundle_price: full.rounded(),
        content_price: content.rounded(),
        missing_vocab_price: missing.rounded(),
        price,
        license_rate: story.content_license_rate,
        rating: story.rating,
    })
}

fn vocab_price(bundle: &Bundle, id: &VocabId, catalog: &RoundConfig) -> Result<Money, PricingError> {
    catalog
        .vocab(id)
        .map(|v| v.price)
        .ok_or_else(|| PricingError::MissingVocab {
            bundle: bundle.id.clone(),
            vocab: id.clone(),
        })
}

fn markup(base: Money, license_rate: f64, subject: &str) -> Money {
    match decimal_from_f64(license_rate) {
        Some(rate) if rate >= Decimal::ONE => base.scaled(rate - Decimal::ONE),
        _ => {
            warn!(subject, license_rate, "license rate below 1.0, content priced at zero");
            Money::ZERO
        }
    }
}
