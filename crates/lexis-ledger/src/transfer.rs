//! Story content transfer between participants
//!
//! Works directly on durable storage: the receiver is debited, the sender
//! credited, and a copy of the story is created for the receiver, all in one
//! store operation.
//!
//! A session writes its own balance on every flush, so a transfer must not
//! run while either participant has a session open.

use std::time::Duration;

use lexis_core::{
    Asset, AssetId, AssetMetadata, AssetType, ExperimentStore, Money, NewAsset, ParticipantId,
    TransferCommit, VocabId,
};
use lexis_market::{DEFAULT_LICENSE_RATE, ensure_affordable, transfer_price};
use lexis_storage::RoundCatalog;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::SessionError;
use crate::ledger::bounded;

/// Record of a completed transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub source_asset: AssetId,
    /// The receiver's new copy
    pub asset: Asset,
    pub price: Money,
    pub license_rate: f64,
    pub sender_balance: Money,
    pub receiver_balance: Money,
}

/// Pass a purchased story from `from` to `to`.
///
/// The receiver pays the content markup at the story's license rate; the
/// vocabulary itself is not charged. Each store call is bounded by
/// `store_timeout`.
#[instrument(skip(store, catalog, store_timeout))]
pub async fn transfer_story_content(
    store: &dyn ExperimentStore,
    catalog: &RoundCatalog,
    from: &ParticipantId,
    to: &ParticipantId,
    asset_id: &AssetId,
    store_timeout: Duration,
) -> Result<TransferReceipt, SessionError> {
    let source = bounded(store_timeout, "get_asset", store.get_asset(asset_id))
        .await?
        .ok_or(SessionError::UnknownAsset(*asset_id))?;
    if source.asset_type != AssetType::StoryTemplate || &source.participant_id != from {
        return Err(SessionError::UnknownAsset(*asset_id));
    }
    if from == to {
        return Err(SessionError::AlreadyOwned(format!("story {asset_id}")));
    }

    let receiver = bounded(store_timeout, "get_participant", store.get_participant(to))
        .await?
        .ok_or_else(|| SessionError::UnknownParticipant(to.clone()))?;
    if bounded(store_timeout, "get_participant", store.get_participant(from))
        .await?
        .is_none()
    {
        return Err(SessionError::UnknownParticipant(from.clone()));
    }

    let round = catalog.get(source.round_id).await?;
    let license_rate = source
        .metadata
        .content_ip_rate
        .or(source.content_license_rate)
        .unwrap_or(DEFAULT_LICENSE_RATE);
    let vocab_ids: Vec<VocabId> = source.vocab_ids().cloned().collect();
    let price = transfer_price(&vocab_ids, license_rate, &round);
    ensure_affordable(price, receiver.balance)?;

    let copy = NewAsset::new(to.clone(), source.round_id, AssetType::StoryTemplate)
        .with_content(source.content_str())
        .with_vocab_ids(&vocab_ids)
        .with_license_rate(Some(license_rate))
        .with_metadata(AssetMetadata {
            story_id: source.metadata.story_id.clone(),
            combo_id: source.metadata.combo_id.clone(),
            price_paid: Some(price),
            content_price: Some(price),
            content_ip_rate: Some(license_rate),
            rating: source.metadata.rating,
            transferred_from: Some(from.clone()),
            ..Default::default()
        });
    let TransferCommit {
        asset,
        sender_balance,
        receiver_balance,
    } = bounded(
        store_timeout,
        "transfer_asset",
        store.transfer_asset(from, copy, price),
    )
    .await?;

    info!(%price, license_rate, new_asset = %asset.asset_id, "Transferred story content");
    Ok(TransferReceipt {
        source_asset: *asset_id,
        asset,
        price,
        license_rate,
        sender_balance,
        receiver_balance,
    })
}
