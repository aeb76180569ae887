//! In-memory storage implementation
//!
//! Suitable for tests and scripted experiment runs. Every trait operation
//! behaves like the persistent store, including newest-first ordering and
//! duplicate rejection.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lexis_core::{
    Asset, AssetId, AssetStatus, AssetStore, AssetType, Money, NewAsset, Participant,
    ParticipantId, ParticipantRepository, RatingStore, RoundConfig, RoundConfigSource,
    StorageError, StoryRating, TransferCommit, TransferStore,
};
use tracing::{debug, trace};

/// An asset plus its creation sequence number
#[derive(Debug, Clone)]
struct StoredAsset {
    seq: u64,
    asset: Asset,
}

/// DashMap-backed implementation of every Lexis storage trait
#[derive(Debug, Default)]
pub struct InMemoryStore {
    assets: DashMap<AssetId, StoredAsset>,
    /// Asset ids per participant in creation order
    by_participant: DashMap<ParticipantId, Vec<AssetId>>,
    participants: DashMap<ParticipantId, Participant>,
    ratings: DashMap<(ParticipantId, AssetId), StoryRating>,
    rounds: DashMap<u32, RoundConfig>,
    next_seq: AtomicU64,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of assets across all participants
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Total number of ratings
    pub fn rating_count(&self) -> usize {
        self.ratings.len()
    }

    fn sorted_by_seq(mut stored: Vec<StoredAsset>) -> Vec<Asset> {
        stored.sort_by_key(|s| s.seq);
        stored.into_iter().map(|s| s.asset).collect()
    }
}

#[async_trait]
impl AssetStore for InMemoryStore {
    async fn create_asset(&self, new: NewAsset) -> Result<Asset, StorageError> {
        let asset = Asset::from_new(new, Utc::now());
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        trace!(asset = %asset.asset_id, kind = %asset.asset_type, seq, "Creating asset");

        self.by_participant
            .entry(asset.participant_id.clone())
            .or_default()
            .push(asset.asset_id);
        self.assets.insert(
            asset.asset_id,
            StoredAsset {
                seq,
                asset: asset.clone(),
            },
        );
        Ok(asset)
    }

    async fn get_asset(&self, asset_id: &AssetId) -> Result<Option<Asset>, StorageError> {
        Ok(self.assets.get(asset_id).map(|s| s.asset.clone()))
    }

    async fn assets_for_participant(
        &self,
        participant: &ParticipantId,
        asset_type: Option<AssetType>,
    ) -> Result<Vec<Asset>, StorageError> {
        let ids = match self.by_participant.get(participant) {
            Some(ids) => ids.clone(),
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| self.assets.get(id).map(|s| s.asset.clone()))
            .filter(|a| asset_type.is_none_or(|t| a.asset_type == t))
            .collect())
    }

    async fn assets_in_round(
        &self,
        round_id: u32,
        asset_type: AssetType,
        status: Option<AssetStatus>,
    ) -> Result<Vec<Asset>, StorageError> {
        let matching: Vec<StoredAsset> = self
            .assets
            .iter()
            .filter(|s| {
                s.asset.round_id == round_id
                    && s.asset.asset_type == asset_type
                    && status.is_none_or(|st| s.asset.status == st)
            })
            .map(|s| s.value().clone())
            .collect();
        Ok(Self::sorted_by_seq(matching))
    }

    async fn update_asset_status(
        &self,
        asset_id: &AssetId,
        status: AssetStatus,
        score: Option<i32>,
        license_rate: Option<f64>,
    ) -> Result<(), StorageError> {
        let mut stored = self
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| StorageError::not_found(format!("asset {asset_id}")))?;
        let asset = &mut stored.asset;
        asset.status = status;
        if score.is_some() {
            asset.score = score;
        }
        if license_rate.is_some() {
            asset.content_license_rate = license_rate;
        }
        asset.updated_at = Utc::now();
        debug!(asset = %asset_id, %status, "Updated asset status");
        Ok(())
    }

    async fn update_asset_content(
        &self,
        asset_id: &AssetId,
        content: &str,
    ) -> Result<(), StorageError> {
        let mut stored = self
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| StorageError::not_found(format!("asset {asset_id}")))?;
        stored.asset.content = Some(content.to_string());
        stored.asset.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_participant_assets(
        &self,
        participant: &ParticipantId,
    ) -> Result<usize, StorageError> {
        let ids = self
            .by_participant
            .remove(participant)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        for id in &ids {
            self.assets.remove(id);
        }
        Ok(ids.len())
    }
}

#[async_trait]
impl ParticipantRepository for InMemoryStore {
    async fn get_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<Participant>, StorageError> {
        Ok(self.participants.get(id).map(|p| p.clone()))
    }

    async fn create_participant(&self, participant: Participant) -> Result<(), StorageError> {
        match self.participants.entry(participant.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::duplicate(format!(
                "participant {}",
                participant.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(participant);
                Ok(())
            }
        }
    }

    async fn set_balance(&self, id: &ParticipantId, balance: Money) -> Result<(), StorageError> {
        let mut participant = self
            .participants
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(format!("participant {id}")))?;
        participant.balance = balance.rounded();
        Ok(())
    }

    async fn adjust_balance(
        &self,
        id: &ParticipantId,
        delta: Money,
    ) -> Result<Money, StorageError> {
        let mut participant = self
            .participants
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(format!("participant {id}")))?;
        participant.balance = (participant.balance + delta).rounded();
        Ok(participant.balance)
    }

    async fn touch_login(&self, id: &ParticipantId) -> Result<(), StorageError> {
        let mut participant = self
            .participants
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(format!("participant {id}")))?;
        participant.last_login = Some(Utc::now());
        Ok(())
    }

    async fn delete_participant(&self, id: &ParticipantId) -> Result<bool, StorageError> {
        if self.participants.remove(id).is_none() {
            return Ok(false);
        }
        let removed = self.delete_participant_assets(id).await?;
        self.ratings.retain(|(rater, _), _| rater != id);
        debug!(participant = %id, assets = removed, "Deleted participant");
        Ok(true)
    }
}

#[async_trait]
impl RatingStore for InMemoryStore {
    async fn create_rating(&self, rating: StoryRating) -> Result<(), StorageError> {
        let key = (rating.rater.clone(), rating.target_asset_id);
        match self.ratings.entry(key) {
            Entry::Occupied(_) => Err(StorageError::duplicate(format!(
                "rating by {} for {}",
                rating.rater, rating.target_asset_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(rating);
                Ok(())
            }
        }
    }

    async fn get_rating(
        &self,
        rater: &ParticipantId,
        target: &AssetId,
    ) -> Result<Option<StoryRating>, StorageError> {
        Ok(self
            .ratings
            .get(&(rater.clone(), *target))
            .map(|r| r.clone()))
    }

    async fn ratings_for_asset(&self, target: &AssetId) -> Result<Vec<StoryRating>, StorageError> {
        let mut ratings: Vec<StoryRating> = self
            .ratings
            .iter()
            .filter(|r| &r.target_asset_id == target)
            .map(|r| r.value().clone())
            .collect();
        ratings.sort_by_key(|r| r.created_at);
        Ok(ratings)
    }

    async fn ratings_by_rater(
        &self,
        rater: &ParticipantId,
    ) -> Result<Vec<StoryRating>, StorageError> {
        let mut ratings: Vec<StoryRating> = self
            .ratings
            .iter()
            .filter(|r| &r.rater == rater)
            .map(|r| r.value().clone())
            .collect();
        ratings.sort_by_key(|r| r.created_at);
        Ok(ratings)
    }
}

#[async_trait]
impl TransferStore for InMemoryStore {
    async fn transfer_asset(
        &self,
        sender: &ParticipantId,
        copy: NewAsset,
        price: Money,
    ) -> Result<TransferCommit, StorageError> {
        let receiver = copy.participant_id.clone();
        // Nothing below can fail once both participants exist
        for id in [sender, &receiver] {
            if !self.participants.contains_key(id) {
                return Err(StorageError::not_found(format!("participant {id}")));
            }
        }
        let receiver_balance = self.adjust_balance(&receiver, -price).await?;
        let sender_balance = self.adjust_balance(sender, price).await?;
        let asset = self.create_asset(copy).await?;
        debug!(asset = %asset.asset_id, %sender, %receiver, %price, "Transferred asset");
        Ok(TransferCommit {
            asset,
            sender_balance,
            receiver_balance,
        })
    }
}

#[async_trait]
impl RoundConfigSource for InMemoryStore {
    async fn load_round_config(&self, round: u32) -> Result<Option<RoundConfig>, StorageError> {
        Ok(self.rounds.get(&round).map(|r| r.clone()))
    }

    async fn put_round_config(&self, config: RoundConfig) -> Result<(), StorageError> {
        match self.rounds.entry(config.round_number) {
            Entry::Occupied(_) => Err(StorageError::duplicate(format!(
                "round {}",
                config.round_number
            ))),
            Entry::Vacant(slot) => {
                slot.insert(config);
                Ok(())
            }
        }
    }
}
