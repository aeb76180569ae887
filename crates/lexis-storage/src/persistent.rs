//! Persistent storage on redb
//!
//! [`RedbStore`] implements every Lexis storage trait on top of
//! [`RedbStorage`]. Asset creation writes the record, the per-participant
//! order index and the sequence counter in one transaction. A transfer adds
//! both balance updates to that same transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lexis_core::{
    Asset, AssetId, AssetStatus, AssetStore, AssetType, Money, NewAsset, Participant,
    ParticipantId, ParticipantRepository, RatingStore, RoundConfig, RoundConfigSource,
    StorageError, StoryRating, TransferCommit, TransferStore,
};
use redb::{ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::tables::{
    ASSETS, PARTICIPANT_ASSETS, PARTICIPANTS, RATINGS, ROUNDS, RedbStorage, RedbStoreConfig,
    compound_key, db_err,
};

const ASSET_SEQ: &str = "asset_seq";

/// Stored form of an asset
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssetRecord {
    seq: u64,
    asset: Asset,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::deserialization(e.to_string()))
}

fn asset_key(id: &AssetId) -> Vec<u8> {
    id.to_string().into_bytes()
}

fn participant_prefix(participant: &ParticipantId) -> Vec<u8> {
    compound_key(&[participant.as_str().as_bytes(), b""])
}

fn index_key(participant: &ParticipantId, seq: u64) -> Vec<u8> {
    compound_key(&[
        participant.as_str().as_bytes(),
        format!("{seq:020}").as_bytes(),
    ])
}

fn rating_key(rater: &ParticipantId, target: &AssetId) -> Vec<u8> {
    compound_key(&[rater.as_str().as_bytes(), target.to_string().as_bytes()])
}

/// redb-backed implementation of every Lexis storage trait
#[derive(Clone)]
pub struct RedbStore {
    storage: Arc<RedbStorage>,
}

impl RedbStore {
    /// Open or create a database at the configured path
    pub fn open(config: RedbStoreConfig) -> Result<Self, StorageError> {
        Ok(Self::new(Arc::new(RedbStorage::open(config)?)))
    }

    pub fn new(storage: Arc<RedbStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &RedbStorage {
        &self.storage
    }

    fn load_record(&self, asset_id: &AssetId) -> Result<Option<AssetRecord>, StorageError> {
        self.storage
            .get(ASSETS, &asset_key(asset_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn modify_asset(
        &self,
        asset_id: &AssetId,
        f: impl FnOnce(&mut Asset),
    ) -> Result<(), StorageError> {
        self.storage.update(
            ASSETS,
            &asset_key(asset_id),
            || format!("asset {asset_id}"),
            |bytes| {
                let mut record: AssetRecord = decode(bytes)?;
                f(&mut record.asset);
                record.asset.updated_at = Utc::now();
                encode(&record)
            },
        )?;
        Ok(())
    }

    fn modify_participant(
        &self,
        id: &ParticipantId,
        f: impl FnOnce(&mut Participant),
    ) -> Result<Participant, StorageError> {
        let bytes = self.storage.update(
            PARTICIPANTS,
            id.as_str().as_bytes(),
            || format!("participant {id}"),
            |bytes| {
                let mut participant: Participant = decode(bytes)?;
                f(&mut participant);
                encode(&participant)
            },
        )?;
        decode(&bytes)
    }
}

/// Write an asset record and its order index inside `txn`
fn insert_asset(txn: &WriteTransaction, asset: &Asset) -> Result<u64, StorageError> {
    let seq = RedbStorage::next_counter(txn, ASSET_SEQ)?;
    let record = encode(&AssetRecord {
        seq,
        asset: asset.clone(),
    })?;
    let id = asset.asset_id.to_string();

    let mut assets = txn.open_table(ASSETS).map_err(db_err)?;
    assets
        .insert(id.as_bytes(), record.as_slice())
        .map_err(db_err)?;
    let mut index = txn.open_table(PARTICIPANT_ASSETS).map_err(db_err)?;
    index
        .insert(
            index_key(&asset.participant_id, seq).as_slice(),
            id.as_bytes(),
        )
        .map_err(db_err)?;
    Ok(seq)
}

#[async_trait]
impl AssetStore for RedbStore {
    #[instrument(skip(self, new), fields(participant = %new.participant_id, kind = %new.asset_type))]
    async fn create_asset(&self, new: NewAsset) -> Result<Asset, StorageError> {
        let asset = Asset::from_new(new, Utc::now());
        let seq = self.storage.write(|txn| insert_asset(txn, &asset))?;
        debug!(asset = %asset.asset_id, seq, "Persisted asset");
        Ok(asset)
    }

    async fn get_asset(&self, asset_id: &AssetId) -> Result<Option<Asset>, StorageError> {
        Ok(self.load_record(asset_id)?.map(|r| r.asset))
    }

    #[instrument(skip(self))]
    async fn assets_for_participant(
        &self,
        participant: &ParticipantId,
        asset_type: Option<AssetType>,
    ) -> Result<Vec<Asset>, StorageError> {
        let index = self
            .storage
            .scan_prefix(PARTICIPANT_ASSETS, &participant_prefix(participant))?;

        let mut assets = Vec::with_capacity(index.len());
        for (_, id_bytes) in index.into_iter().rev() {
            let Some(bytes) = self.storage.get(ASSETS, &id_bytes)? else {
                continue;
            };
            let record: AssetRecord = decode(&bytes)?;
            if asset_type.is_none_or(|t| record.asset.asset_type == t) {
                assets.push(record.asset);
            }
        }
        Ok(assets)
    }

    #[instrument(skip(self))]
    async fn assets_in_round(
        &self,
        round_id: u32,
        asset_type: AssetType,
        status: Option<AssetStatus>,
    ) -> Result<Vec<Asset>, StorageError> {
        let mut records = Vec::new();
        for bytes in self.storage.scan_all(ASSETS)? {
            let record: AssetRecord = decode(&bytes)?;
            let asset = &record.asset;
            if asset.round_id == round_id
                && asset.asset_type == asset_type
                && status.is_none_or(|s| asset.status == s)
            {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.seq);
        Ok(records.into_iter().map(|r| r.asset).collect())
    }

    #[instrument(skip(self))]
    async fn update_asset_status(
        &self,
        asset_id: &AssetId,
        status: AssetStatus,
        score: Option<i32>,
        license_rate: Option<f64>,
    ) -> Result<(), StorageError> {
        self.modify_asset(asset_id, |asset| {
            asset.status = status;
            if score.is_some() {
                asset.score = score;
            }
            if license_rate.is_some() {
                asset.content_license_rate = license_rate;
            }
        })
    }

    #[instrument(skip(self, content))]
    async fn update_asset_content(
        &self,
        asset_id: &AssetId,
        content: &str,
    ) -> Result<(), StorageError> {
        self.modify_asset(asset_id, |asset| asset.content = Some(content.to_string()))
    }

    #[instrument(skip(self))]
    async fn delete_participant_assets(
        &self,
        participant: &ParticipantId,
    ) -> Result<usize, StorageError> {
        let index = self
            .storage
            .scan_prefix(PARTICIPANT_ASSETS, &participant_prefix(participant))?;
        self.storage.write(|txn| {
            let mut assets = txn.open_table(ASSETS).map_err(db_err)?;
            let mut order = txn.open_table(PARTICIPANT_ASSETS).map_err(db_err)?;
            for (key, id_bytes) in &index {
                assets.remove(id_bytes.as_slice()).map_err(db_err)?;
                order.remove(key.as_slice()).map_err(db_err)?;
            }
            Ok(index.len())
        })
    }
}

#[async_trait]
impl ParticipantRepository for RedbStore {
    async fn get_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<Participant>, StorageError> {
        self.storage
            .get(PARTICIPANTS, id.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    #[instrument(skip(self, participant), fields(participant = %participant.id))]
    async fn create_participant(&self, participant: Participant) -> Result<(), StorageError> {
        let value = encode(&participant)?;
        self.storage.insert_new(
            PARTICIPANTS,
            participant.id.as_str().as_bytes(),
            &value,
            || format!("participant {}", participant.id),
        )
    }

    #[instrument(skip(self))]
    async fn set_balance(&self, id: &ParticipantId, balance: Money) -> Result<(), StorageError> {
        self.modify_participant(id, |p| p.balance = balance.rounded())?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn adjust_balance(
        &self,
        id: &ParticipantId,
        delta: Money,
    ) -> Result<Money, StorageError> {
        let participant = self.modify_participant(id, |p| p.balance = (p.balance + delta).rounded())?;
        Ok(participant.balance)
    }

    async fn touch_login(&self, id: &ParticipantId) -> Result<(), StorageError> {
        self.modify_participant(id, |p| p.last_login = Some(Utc::now()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_participant(&self, id: &ParticipantId) -> Result<bool, StorageError> {
        if !self.storage.delete(PARTICIPANTS, id.as_str().as_bytes())? {
            return Ok(false);
        }
        let assets = self.delete_participant_assets(id).await?;
        let ratings = self.storage.scan_prefix(RATINGS, &participant_prefix(id))?;
        self.storage.write(|txn| {
            let mut table = txn.open_table(RATINGS).map_err(db_err)?;
            for (key, _) in &ratings {
                table.remove(key.as_slice()).map_err(db_err)?;
            }
            Ok(())
        })?;
        debug!(assets, ratings = ratings.len(), "Deleted participant");
        Ok(true)
    }
}

#[async_trait]
impl RatingStore for RedbStore {
    #[instrument(skip(self, rating), fields(rater = %rating.rater, target = %rating.target_asset_id))]
    async fn create_rating(&self, rating: StoryRating) -> Result<(), StorageError> {
        let value = encode(&rating)?;
        self.storage.insert_new(
            RATINGS,
            &rating_key(&rating.rater, &rating.target_asset_id),
            &value,
            || format!("rating by {} for {}", rating.rater, rating.target_asset_id),
        )
    }

    async fn get_rating(
        &self,
        rater: &ParticipantId,
        target: &AssetId,
    ) -> Result<Option<StoryRating>, StorageError> {
        self.storage
            .get(RATINGS, &rating_key(rater, target))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn ratings_for_asset(&self, target: &AssetId) -> Result<Vec<StoryRating>, StorageError> {
        let mut ratings = Vec::new();
        for bytes in self.storage.scan_all(RATINGS)? {
            let rating: StoryRating = decode(&bytes)?;
            if &rating.target_asset_id == target {
                ratings.push(rating);
            }
        }
        ratings.sort_by_key(|r| r.created_at);
        Ok(ratings)
    }

    async fn ratings_by_rater(
        &self,
        rater: &ParticipantId,
    ) -> Result<Vec<StoryRating>, StorageError> {
        let mut ratings = self
            .storage
            .scan_prefix(RATINGS, &participant_prefix(rater))?
            .into_iter()
            .map(|(_, bytes)| decode::<StoryRating>(&bytes))
            .collect::<Result<Vec<_>, _>>()?;
        ratings.sort_by_key(|r| r.created_at);
        Ok(ratings)
    }
}

#[async_trait]
impl TransferStore for RedbStore {
    #[instrument(skip(self, copy), fields(receiver = %copy.participant_id))]
    async fn transfer_asset(
        &self,
        sender: &ParticipantId,
        copy: NewAsset,
        price: Money,
    ) -> Result<TransferCommit, StorageError> {
        let asset = Asset::from_new(copy, Utc::now());
        let receiver = asset.participant_id.clone();

        let (receiver_balance, sender_balance, seq) = self.storage.write(|txn| {
            let mut balances = Vec::with_capacity(2);
            {
                let mut participants = txn.open_table(PARTICIPANTS).map_err(db_err)?;
                for (id, delta) in [(&receiver, -price), (sender, price)] {
                    let key = id.as_str().as_bytes();
                    let current = participants
                        .get(key)
                        .map_err(db_err)?
                        .map(|v| v.value().to_vec())
                        .ok_or_else(|| StorageError::not_found(format!("participant {id}")))?;
                    let mut participant: Participant = decode(&current)?;
                    participant.balance = (participant.balance + delta).rounded();
                    participants
                        .insert(key, encode(&participant)?.as_slice())
                        .map_err(db_err)?;
                    balances.push(participant.balance);
                }
            }
            let seq = insert_asset(txn, &asset)?;
            Ok((balances[0], balances[1], seq))
        })?;

        debug!(asset = %asset.asset_id, seq, %price, "Committed transfer");
        Ok(TransferCommit {
            asset,
            sender_balance,
            receiver_balance,
        })
    }
}

#[async_trait]
impl RoundConfigSource for RedbStore {
    async fn load_round_config(&self, round: u32) -> Result<Option<RoundConfig>, StorageError> {
        self.storage
            .get(ROUNDS, &round.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    #[instrument(skip(self, config), fields(round = config.round_number))]
    async fn put_round_config(&self, config: RoundConfig) -> Result<(), StorageError> {
        let value = encode(&config)?;
        self.storage.insert_new(
            ROUNDS,
            &config.round_number.to_be_bytes(),
            &value,
            || format!("round {}", config.round_number),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexis_core::{AssetMetadata, RatingScores, VocabId};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RedbStore {
        RedbStore::open(RedbStoreConfig::default().with_path(dir.path().join("lexis.redb"))).unwrap()
    }

    #[tokio::test]
    async fn test_asset_round_trip_keeps_metadata() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let metadata = AssetMetadata {
            price_paid: Some(Money::new(dec!(30.00))),
            content_ip_rate: Some(1.5),
            ..Default::default()
        };
        let words = [VocabId::from("va2"), VocabId::from("va1")];
        let created = store
            .create_asset(
                NewAsset::new(ParticipantId::from("a1"), 1, AssetType::StoryTemplate)
                    .with_content("A quantum cat.")
                    .with_vocab_ids(&words)
                    .with_metadata(metadata.clone()),
            )
            .await
            .unwrap();

        let loaded = store.get_asset(&created.asset_id).await.unwrap().unwrap();
        assert_eq!(loaded.metadata, metadata);
        assert_eq!(loaded.used_vocab_ids, created.used_vocab_ids);
        assert_eq!(loaded.content.as_deref(), Some("A quantum cat."));
    }

    #[tokio::test]
    async fn test_newest_first_across_many_assets() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let participant = ParticipantId::from("a1");
        let mut ids = Vec::new();
        for i in 0..12 {
            let asset = store
                .create_asset(
                    NewAsset::new(participant.clone(), 1, AssetType::StoryDraft)
                        .with_content(format!("draft {i}")),
                )
                .await
                .unwrap();
            ids.push(asset.asset_id);
        }
        let listed: Vec<AssetId> = store
            .assets_for_participant(&participant, None)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.asset_id)
            .collect();
        ids.reverse();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn test_round_configs_are_append_only() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let config = RoundConfig {
            round_number: 3,
            initial_balance: Money::from_major(100),
            draw_price: Money::from_major(10),
            vocabularies: vec![],
            bundles: vec![],
        };
        store.put_round_config(config.clone()).await.unwrap();
        let err = store.put_round_config(config).await.unwrap_err();
        assert!(err.is_duplicate());
        assert!(store.load_round_config(3).await.unwrap().is_some());
        assert!(store.load_round_config(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ratings_by_rater_uses_prefix() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let scores = RatingScores::new(3, 4, 5).unwrap();
        for rater in ["r1", "r1", "r10"] {
            store
                .create_rating(StoryRating::new(
                    ParticipantId::from(rater),
                    AssetId::generate(),
                    scores,
                    2.0,
                ))
                .await
                .unwrap();
        }
        let ratings = store
            .ratings_by_rater(&ParticipantId::from("r1"))
            .await
            .unwrap();
        assert_eq!(ratings.len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_commits_or_rolls_back_as_one() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let seller = ParticipantId::from("seller");
        let buyer = ParticipantId::from("buyer");
        for id in [&seller, &buyer] {
            store
                .create_participant(Participant::new(id.clone(), 1, Money::from_major(100)))
                .await
                .unwrap();
        }
        let copy = || {
            NewAsset::new(buyer.clone(), 1, AssetType::StoryTemplate).with_content("A quantum cat.")
        };

        let commit = store
            .transfer_asset(&seller, copy(), Money::new(dec!(12.50)))
            .await
            .unwrap();
        assert_eq!(commit.receiver_balance, Money::new(dec!(87.50)));
        assert_eq!(commit.sender_balance, Money::new(dec!(112.50)));
        let owned = store.assets_for_participant(&buyer, None).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].asset_id, commit.asset.asset_id);

        // Missing sender aborts the whole transaction, including the debit
        let err = store
            .transfer_asset(&ParticipantId::from("ghost"), copy(), Money::from_major(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        let stored = store.get_participant(&buyer).await.unwrap().unwrap();
        assert_eq!(stored.balance, Money::new(dec!(87.50)));
        assert_eq!(store.assets_for_participant(&buyer, None).await.unwrap().len(), 1);
    }
}
