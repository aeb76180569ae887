//! Transaction ledger and flush
//!
//! The ledger is a FIFO of pending transactions. A flush walks the queue in
//! order and persists each entry unless its dedup key is already present in
//! the round's durable assets or was written earlier in the same flush. Entries are
//! reported as processed only once their effect is durable, so a retried
//! flush never writes an effect twice.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;

use lexis_core::{
    Asset, AssetId, AssetStatus, AssetStore, AssetType, ParticipantId, StorageError,
};
use tracing::{debug, info, warn};

use crate::transaction::{DedupKey, LedgerEntry, Transaction};

/// Run a store call with a deadline
pub(crate) async fn bounded<T>(
    limit: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StorageError::timeout(operation))?
}

/// Pending transactions in append order
#[derive(Debug, Default)]
pub struct Ledger {
    entries: VecDeque<LedgerEntry>,
    next_seq: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transaction, returning its sequence number
    pub fn append(&mut self, transaction: Transaction) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(LedgerEntry { seq, transaction });
        seq
    }

    /// Copy of the pending queue
    pub fn pending(&self) -> Vec<LedgerEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Drop entries whose sequence numbers were processed
    pub fn remove_processed(&mut self, processed: &[u64]) {
        let processed: HashSet<u64> = processed.iter().copied().collect();
        self.entries.retain(|e| !processed.contains(&e.seq));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What durable storage already holds for one participant
#[derive(Debug, Clone, Default)]
pub struct DurableSnapshot {
    keys: HashSet<DedupKey>,
    /// Active or submitted creations
    live_creations: Vec<AssetId>,
    /// Non-inactive drafts, newest first
    live_drafts: Vec<AssetId>,
}

impl DurableSnapshot {
    /// Build from a participant's assets, newest first
    pub fn from_assets(assets: &[Asset]) -> Self {
        let mut snapshot = Self::default();
        for asset in assets {
            snapshot.observe(asset, false);
        }
        snapshot
    }

    /// Build from the assets of one round only. Ownership is per round, so
    /// an earlier round's purchase never hides a new one.
    pub fn for_round(assets: &[Asset], round: u32) -> Self {
        let mut snapshot = Self::default();
        for asset in assets.iter().filter(|a| a.round_id == round) {
            snapshot.observe(asset, false);
        }
        snapshot
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Record an asset written during this flush
    pub fn record(&mut self, asset: &Asset) {
        self.observe(asset, true);
    }

    fn observe(&mut self, asset: &Asset, newest: bool) {
        if let Some(key) = DedupKey::for_asset(asset) {
            self.keys.insert(key);
        }
        match asset.asset_type {
            AssetType::UserCreation if asset.status.is_live() => {
                self.live_creations.push(asset.asset_id)
            }
            AssetType::StoryDraft if asset.status != AssetStatus::Inactive => {
                if newest {
                    self.live_drafts.insert(0, asset.asset_id);
                } else {
                    self.live_drafts.push(asset.asset_id);
                }
            }
            _ => {}
        }
    }

    pub fn live_creations(&self) -> &[AssetId] {
        &self.live_creations
    }

    pub fn live_drafts(&self) -> &[AssetId] {
        &self.live_drafts
    }
}

/// Result of one flush pass
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Sequence numbers that may leave the queue
    pub processed: Vec<u64>,
    /// Assets created by this pass
    pub persisted: Vec<Asset>,
    /// Entries whose effect was already durable
    pub skipped: usize,
    /// Failure that stopped the pass early
    pub error: Option<StorageError>,
}

impl FlushOutcome {
    /// Every entry was handled
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Writes pending entries for one participant
pub struct Flusher<'a, S: AssetStore + ?Sized> {
    store: &'a S,
    participant: &'a ParticipantId,
    round: u32,
    store_timeout: Duration,
    draft_retention: usize,
}

impl<'a, S: AssetStore + ?Sized> Flusher<'a, S> {
    pub fn new(
        store: &'a S,
        participant: &'a ParticipantId,
        round: u32,
        store_timeout: Duration,
        draft_retention: usize,
    ) -> Self {
        Self {
            store,
            participant,
            round,
            store_timeout,
            draft_retention,
        }
    }

    /// Load the snapshot and flush against it
    pub async fn flush(&self, pending: &[LedgerEntry]) -> FlushOutcome {
        let loaded = bounded(
            self.store_timeout,
            "assets_for_participant",
            self.store.assets_for_participant(self.participant, None),
        )
        .await;
        match loaded {
            Ok(assets) => {
                let mut snapshot = DurableSnapshot::for_round(&assets, self.round);
                self.flush_against(pending, &mut snapshot).await
            }
            Err(e) => FlushOutcome {
                error: Some(e),
                ..Default::default()
            },
        }
    }

    /// Flush `pending` in FIFO order against a known snapshot.
    ///
    /// The first failure stops the pass; entries processed before it stay
    /// processed.
    pub async fn flush_against(
        &self,
        pending: &[LedgerEntry],
        snapshot: &mut DurableSnapshot,
    ) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();

        for entry in pending {
            if let Some(key) = entry.transaction.dedup_key()
                && snapshot.contains(&key)
            {
                debug!(seq = entry.seq, kind = entry.transaction.kind(), "Already persisted");
                outcome.processed.push(entry.seq);
                outcome.skipped += 1;
                continue;
            }

            let asset = match self.persist(&entry.transaction, snapshot).await {
                Ok(asset) => asset,
                Err(e) => {
                    warn!(seq = entry.seq, kind = entry.transaction.kind(), error = %e, "Flush stopped");
                    outcome.error = Some(e);
                    break;
                }
            };
            snapshot.record(&asset);
            outcome.processed.push(entry.seq);
            outcome.persisted.push(asset);

            if matches!(entry.transaction, Transaction::SaveDraft { .. })
                && let Err(e) = self.retire_old_drafts(snapshot).await
            {
                warn!(error = %e, "Failed to retire old drafts");
                outcome.error = Some(e);
                break;
            }
        }

        if !outcome.processed.is_empty() {
            info!(
                participant = %self.participant,
                persisted = outcome.persisted.len(),
                skipped = outcome.skipped,
                complete = outcome.is_complete(),
                "Flushed ledger entries"
            );
        }
        outcome
    }

    async fn persist(
        &self,
        transaction: &Transaction,
        snapshot: &mut DurableSnapshot,
    ) -> Result<Asset, StorageError> {
        if matches!(transaction, Transaction::SubmitStory { .. }) {
            // Only one creation may be live at a time
            while let Some(previous) = snapshot.live_creations.first().copied() {
                bounded(
                    self.store_timeout,
                    "update_asset_status",
                    self.store
                        .update_asset_status(&previous, AssetStatus::Inactive, None, None),
                )
                .await?;
                snapshot.live_creations.remove(0);
                debug!(asset = %previous, "Retired previous creation");
            }
        }

        let new = transaction.to_new_asset(self.participant, self.round);
        bounded(self.store_timeout, "create_asset", self.store.create_asset(new)).await
    }

    async fn retire_old_drafts(&self, snapshot: &mut DurableSnapshot) -> Result<(), StorageError> {
        while snapshot.live_drafts.len() > self.draft_retention {
            let Some(oldest) = snapshot.live_drafts.last().copied() else {
                break;
            };
            bounded(
                self.store_timeout,
                "update_asset_status",
                self.store
                    .update_asset_status(&oldest, AssetStatus::Inactive, None, None),
            )
            .await?;
            snapshot.live_drafts.pop();
            debug!(asset = %oldest, "Retired old draft");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexis_core::{BundleId, Money, VocabId};
    use lexis_storage::InMemoryStore;

    fn bundle_tx(ids: &[&str]) -> Transaction {
        Transaction::PurchaseBundle {
            bundle_id: BundleId::from("ca1"),
            vocab_ids: ids.iter().map(|id| VocabId::from(*id)).collect(),
            price: Money::from_major(20),
        }
    }

    fn draft_tx(text: &str) -> Transaction {
        Transaction::SaveDraft {
            content: text.to_string(),
            vocab_ids: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ledger_sequence_and_removal() {
        let mut ledger = Ledger::new();
        let a = ledger.append(bundle_tx(&["va1"]));
        let b = ledger.append(bundle_tx(&["va2"]));
        let c = ledger.append(bundle_tx(&["va3"]));
        assert_eq!((a, b, c), (0, 1, 2));

        ledger.remove_processed(&[a, c]);
        let remaining = ledger.pending();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq, b);

        // Sequence numbers never restart
        assert_eq!(ledger.append(bundle_tx(&["va4"])), 3);
    }

    #[tokio::test]
    async fn test_duplicates_within_one_pass_are_skipped() {
        let store = InMemoryStore::new();
        let participant = ParticipantId::from("a1");
        let flusher = Flusher::new(&store, &participant, 1, Duration::from_secs(1), 5);

        let mut ledger = Ledger::new();
        ledger.append(bundle_tx(&["va1", "va2"]));
        ledger.append(bundle_tx(&["va2", "va1"]));

        let outcome = flusher.flush(&ledger.pending()).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.processed, vec![0, 1]);
        assert_eq!(outcome.persisted.len(), 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.asset_count(), 1);
    }

    #[tokio::test]
    async fn test_draft_retention_keeps_newest() {
        let store = InMemoryStore::new();
        let participant = ParticipantId::from("a1");
        let flusher = Flusher::new(&store, &participant, 1, Duration::from_secs(1), 2);

        let mut ledger = Ledger::new();
        for text in ["one", "two", "three", "four"] {
            ledger.append(draft_tx(text));
        }
        let outcome = flusher.flush(&ledger.pending()).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.persisted.len(), 4);

        let drafts = store
            .assets_for_participant(&participant, Some(AssetType::StoryDraft))
            .await
            .unwrap();
        let live: Vec<&str> = drafts
            .iter()
            .filter(|d| d.status != AssetStatus::Inactive)
            .map(|d| d.content_str())
            .collect();
        assert_eq!(live, vec!["four", "three"]);
        assert_eq!(drafts.len(), 4);
    }

    #[tokio::test]
    async fn test_snapshot_from_existing_assets() {
        let store = InMemoryStore::new();
        let participant = ParticipantId::from("a1");
        let flusher = Flusher::new(&store, &participant, 1, Duration::from_secs(1), 5);

        let mut ledger = Ledger::new();
        ledger.append(bundle_tx(&["va1"]));
        flusher.flush(&ledger.pending()).await;

        let assets = store
            .assets_for_participant(&participant, None)
            .await
            .unwrap();
        let snapshot = DurableSnapshot::from_assets(&assets);
        assert!(snapshot.contains(&DedupKey::Bundle(vec![VocabId::from("va1")])));
        assert!(snapshot.live_creations().is_empty());
        assert!(!DurableSnapshot::for_round(&assets, 2).contains(&DedupKey::Bundle(vec![
            VocabId::from("va1")
        ])));
    }

    #[tokio::test]
    async fn test_earlier_round_does_not_mask_purchase() {
        let store = InMemoryStore::new();
        let participant = ParticipantId::from("a1");
        let mut ledger = Ledger::new();
        ledger.append(bundle_tx(&["va1", "va2"]));

        let round_one = Flusher::new(&store, &participant, 1, Duration::from_secs(1), 5);
        assert_eq!(round_one.flush(&ledger.pending()).await.persisted.len(), 1);

        let round_two = Flusher::new(&store, &participant, 2, Duration::from_secs(1), 5);
        let outcome = round_two.flush(&ledger.pending()).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.persisted.len(), 1);
        assert_eq!(outcome.persisted[0].round_id, 2);
        assert_eq!(store.asset_count(), 2);
    }
}
