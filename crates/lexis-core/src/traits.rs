//! Storage traits
//!
//! The ledger, session and transfer code only ever talk to storage through
//! these operations. Implementations live in `lexis-storage`.

use async_trait::async_trait;

use crate::asset::{Asset, AssetStatus, AssetType, NewAsset};
use crate::error::StorageError;
use crate::ids::{AssetId, ParticipantId};
use crate::money::Money;
use crate::participant::Participant;
use crate::rating::StoryRating;
use crate::round::RoundConfig;

/// Persistence for assets
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist a new asset, assigning a fresh id and timestamps
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, StorageError>;

    /// Look up a single asset
    async fn get_asset(&self, asset_id: &AssetId) -> Result<Option<Asset>, StorageError>;

    /// All assets of a participant, optionally filtered by type.
    ///
    /// Ordered newest-first by creation order.
    async fn assets_for_participant(
        &self,
        participant: &ParticipantId,
        asset_type: Option<AssetType>,
    ) -> Result<Vec<Asset>, StorageError>;

    /// Assets of one type in a round, optionally filtered by status.
    ///
    /// Ordered oldest-first.
    async fn assets_in_round(
        &self,
        round_id: u32,
        asset_type: AssetType,
        status: Option<AssetStatus>,
    ) -> Result<Vec<Asset>, StorageError>;

    /// Transition an asset's status, optionally setting score and license rate
    async fn update_asset_status(
        &self,
        asset_id: &AssetId,
        status: AssetStatus,
        score: Option<i32>,
        license_rate: Option<f64>,
    ) -> Result<(), StorageError>;

    /// Replace an asset's content
    async fn update_asset_content(
        &self,
        asset_id: &AssetId,
        content: &str,
    ) -> Result<(), StorageError>;

    /// Remove every asset of a participant. Returns the number removed.
    async fn delete_participant_assets(
        &self,
        participant: &ParticipantId,
    ) -> Result<usize, StorageError>;
}

/// Persistence for participant records
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn get_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<Option<Participant>, StorageError>;

    /// Insert a participant. Fails with `Duplicate` if the id exists.
    async fn create_participant(&self, participant: Participant) -> Result<(), StorageError>;

    /// Overwrite the stored balance (last writer wins)
    async fn set_balance(&self, id: &ParticipantId, balance: Money) -> Result<(), StorageError>;

    /// Add `delta` (possibly negative) to the stored balance, returning the new value
    async fn adjust_balance(
        &self,
        id: &ParticipantId,
        delta: Money,
    ) -> Result<Money, StorageError>;

    /// Record a login timestamp
    async fn touch_login(&self, id: &ParticipantId) -> Result<(), StorageError>;

    /// Remove a participant together with its assets and ratings.
    ///
    /// Returns `false` when the participant did not exist.
    async fn delete_participant(&self, id: &ParticipantId) -> Result<bool, StorageError>;
}

/// Persistence for ratings
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Insert a rating. A second rating for the same rater and target
    /// fails with `Duplicate` and leaves the first untouched.
    async fn create_rating(&self, rating: StoryRating) -> Result<(), StorageError>;

    async fn get_rating(
        &self,
        rater: &ParticipantId,
        target: &AssetId,
    ) -> Result<Option<StoryRating>, StorageError>;

    async fn ratings_for_asset(&self, target: &AssetId) -> Result<Vec<StoryRating>, StorageError>;

    async fn ratings_by_rater(
        &self,
        rater: &ParticipantId,
    ) -> Result<Vec<StoryRating>, StorageError>;
}

/// A story copy and both balances after a committed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCommit {
    pub asset: Asset,
    pub sender_balance: Money,
    pub receiver_balance: Money,
}

/// Moving purchased content between participants
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Create `copy` for its participant, debit that participant `price`
    /// and credit `sender` the same amount.
    ///
    /// The three writes commit together or not at all. Fails with
    /// `NotFound` when either participant is missing.
    async fn transfer_asset(
        &self,
        sender: &ParticipantId,
        copy: NewAsset,
        price: Money,
    ) -> Result<TransferCommit, StorageError>;
}

/// Append-only storage of round configurations
#[async_trait]
pub trait RoundConfigSource: Send + Sync {
    async fn load_round_config(&self, round: u32) -> Result<Option<RoundConfig>, StorageError>;

    /// Store a new round. Fails with `Duplicate` if the round already exists.
    async fn put_round_config(&self, config: RoundConfig) -> Result<(), StorageError>;
}

/// Everything a session needs from durable storage
pub trait ExperimentStore: AssetStore + ParticipantRepository + RatingStore + TransferStore {}

impl<T> ExperimentStore for T where
    T: AssetStore + ParticipantRepository + RatingStore + TransferStore + ?Sized
{
}
