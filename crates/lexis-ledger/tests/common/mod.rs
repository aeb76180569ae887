//! Shared fixtures for ledger integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lexis_core::{
    Asset, AssetId, AssetStatus, AssetStore, AssetType, Bundle, BundleId, BundledStory, Money,
    NewAsset, Participant, ParticipantId, ParticipantRepository, RatingStore, RoundConfig,
    RoundConfigSource, StorageError, StoryId, StoryRating, TransferCommit, TransferStore,
    VocabEntry, VocabId,
};
use lexis_ledger::{Session, SessionConfig, SessionDeps};
use lexis_storage::{InMemoryStore, RoundCatalog, RoundCatalogConfig};

pub const STORY: &str = "A quantum leap. The cat slept.";

fn vocab(id: &str, word: &str, price: i64) -> VocabEntry {
    VocabEntry {
        id: VocabId::from(id),
        word: word.to_string(),
        price: Money::from_major(price),
        category: "basic".to_string(),
    }
}

/// va1 "quantum" 10, va2 "cat" 10, va3 "moon" 5; bundle ca1 = va1 + va2
/// with story sa1 at license rate 1.5
pub fn round_one() -> RoundConfig {
    RoundConfig {
        round_number: 1,
        initial_balance: Money::from_major(100),
        draw_price: Money::from_major(10),
        vocabularies: vec![
            vocab("va1", "quantum", 10),
            vocab("va2", "cat", 10),
            vocab("va3", "moon", 5),
        ],
        bundles: vec![
            Bundle {
                id: BundleId::from("ca1"),
                owner_tag: "system".to_string(),
                vocab_ids: vec![VocabId::from("va1"), VocabId::from("va2")],
                stories: vec![BundledStory {
                    id: StoryId::from("sa1"),
                    content: STORY.to_string(),
                    rating: 4.5,
                    content_license_rate: 1.5,
                }],
            },
            Bundle {
                id: BundleId::from("ca2"),
                owner_tag: "system".to_string(),
                vocab_ids: vec![VocabId::from("va3")],
                stories: vec![],
            },
        ],
    }
}

/// Round one's catalog carried into round two unchanged
pub fn round_two() -> RoundConfig {
    RoundConfig {
        round_number: 2,
        ..round_one()
    }
}

/// Store wrapper whose writes can be made to fail or stall
pub struct FlakyStore {
    pub inner: InMemoryStore,
    fail_writes: AtomicBool,
    /// Milliseconds each asset write sleeps before running
    write_delay_ms: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_writes: AtomicBool::new(false),
            write_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn before_write(&self) -> Result<(), StorageError> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::database("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStore for FlakyStore {
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, StorageError> {
        self.before_write().await?;
        self.inner.create_asset(asset).await
    }

    async fn get_asset(&self, asset_id: &AssetId) -> Result<Option<Asset>, StorageError> {
        self.inner.get_asset(asset_id).await
    }

    async fn assets_for_participant(
        &self,
        participant: &ParticipantId,
        asset_type: Option<AssetType>,
    ) -> Result<Vec<Asset>, StorageError> {
        self.inner.assets_for_participant(participant, asset_type).await
    }

    async fn assets_in_round(
        &self,
        round_id: u32,
        asset_type: AssetType,
        status: Option<AssetStatus>,
    ) -> Result<Vec<Asset>, StorageError> {
        self.inner.assets_in_round(round_id, asset_type, status).await
    }

    async fn update_asset_status(
        &self,
        asset_id: &AssetId,
        status: AssetStatus,
        score: Option<i32>,
        license_rate: Option<f64>,
    ) -> Result<(), StorageError> {
        self.before_write().await?;
        self.inner
            .update_asset_status(asset_id, status, score, license_rate)
            .await
    }

    async fn update_asset_content(
        &self,
        asset_id: &AssetId,
        content: &str,
    ) -> Result<(), StorageError> {
        self.inner.update_asset_content(asset_id, content).await
    }

    async fn delete_participant_assets(
        &self,
        participant: &ParticipantId,
    ) -> Result<usize, StorageError> {
        self.inner.delete_participant_assets(participant).await
    }
}

#[async_trait]
impl ParticipantRepository for FlakyStore {
    async fn get_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<Participant>, StorageError> {
        self.inner.get_participant(id).await
    }

    async fn create_participant(&self, participant: Participant) -> Result<(), StorageError> {
        self.inner.create_participant(participant).await
    }

    async fn set_balance(&self, id: &ParticipantId, balance: Money) -> Result<(), StorageError> {
        self.before_write().await?;
        self.inner.set_balance(id, balance).await
    }

    async fn adjust_balance(
        &self,
        id: &ParticipantId,
        delta: Money,
    ) -> Result<Money, StorageError> {
        self.inner.adjust_balance(id, delta).await
    }

    async fn touch_login(&self, id: &ParticipantId) -> Result<(), StorageError> {
        self.inner.touch_login(id).await
    }

    async fn delete_participant(&self, id: &ParticipantId) -> Result<bool, StorageError> {
        self.inner.delete_participant(id).await
    }
}

#[async_trait]
impl RatingStore for FlakyStore {
    async fn create_rating(&self, rating: StoryRating) -> Result<(), StorageError> {
        self.inner.create_rating(rating).await
    }

    async fn get_rating(
        &self,
        rater: &ParticipantId,
        target: &AssetId,
    ) -> Result<Option<StoryRating>, StorageError> {
        self.inner.get_rating(rater, target).await
    }

    async fn ratings_for_asset(&self, target: &AssetId) -> Result<Vec<StoryRating>, StorageError> {
        self.inner.ratings_for_asset(target).await
    }

    async fn ratings_by_rater(
        &self,
        rater: &ParticipantId,
    ) -> Result<Vec<StoryRating>, StorageError> {
        self.inner.ratings_by_rater(rater).await
    }
}

#[async_trait]
impl TransferStore for FlakyStore {
    async fn transfer_asset(
        &self,
        sender: &ParticipantId,
        copy: NewAsset,
        price: Money,
    ) -> Result<TransferCommit, StorageError> {
        self.before_write().await?;
        self.inner.transfer_asset(sender, copy, price).await
    }
}

/// A store plus a catalog holding rounds one and two
pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub catalog: Arc<RoundCatalog>,
}

impl Harness {
    pub async fn new() -> Self {
        let rounds = Arc::new(InMemoryStore::new());
        rounds.put_round_config(round_one()).await.unwrap();
        rounds.put_round_config(round_two()).await.unwrap();
        let catalog = Arc::new(RoundCatalog::new(rounds, RoundCatalogConfig::default()));
        Self {
            store: Arc::new(FlakyStore::new()),
            catalog,
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps::new(self.store.clone(), Arc::clone(&self.catalog))
    }

    pub async fn open(&self, participant: &str) -> Session {
        self.open_in(participant, 1).await
    }

    pub async fn open_in(&self, participant: &str, round: u32) -> Session {
        Session::open(
            ParticipantId::from(participant),
            round,
            self.deps(),
            SessionConfig::testing(),
        )
        .await
        .unwrap()
    }

    /// Persisted assets of one type, newest first
    pub async fn assets(&self, participant: &str, kind: AssetType) -> Vec<Asset> {
        self.store
            .assets_for_participant(&ParticipantId::from(participant), Some(kind))
            .await
            .unwrap()
    }

    pub async fn stored_balance(&self, participant: &str) -> Money {
        self.store
            .get_participant(&ParticipantId::from(participant))
            .await
            .unwrap()
            .unwrap()
            .balance
    }
}
