//! redb table definitions and storage manager
//!
//! Records are serde_json-encoded. Keys are UTF-8 strings except where a
//! big-endian integer keeps range scans in numeric order.

use std::path::PathBuf;
use std::sync::Arc;

use lexis_core::StorageError;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, info, instrument};

/// Type alias for scan results to simplify complex type
pub type ScanResults = Vec<(Vec<u8>, Vec<u8>)>;

// Key: asset id (hyphenated), Value: serialized StoredAssetRecord
pub const ASSETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("assets");

// Key: participant id, 0x00, zero-padded creation sequence; Value: asset id
pub const PARTICIPANT_ASSETS: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("participant_assets");

// Key: participant id, Value: serialized Participant
pub const PARTICIPANTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("participants");

// Key: rater id, 0x00, target asset id; Value: serialized StoryRating
pub const RATINGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ratings");

// Key: round number (u32 big-endian), Value: serialized RoundConfig
pub const ROUNDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("rounds");

// Key: counter name, Value: u64 big-endian
pub const COUNTERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("counters");

/// Map any redb error into a storage error
pub(crate) fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Join key parts with a NUL separator
pub(crate) fn compound_key(parts: &[&[u8]]) -> Vec<u8> {
    parts.join(&0u8)
}

/// Configuration for the redb store
#[derive(Debug, Clone)]
pub struct RedbStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/lexis.redb"),
        }
    }
}

impl RedbStoreConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }
}

/// Main redb storage manager
pub struct RedbStorage {
    db: Arc<Database>,
    config: RedbStoreConfig,
}

impl RedbStorage {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbStoreConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path).map_err(db_err)?;
        info!("Opened redb database");

        let storage = Self {
            db: Arc::new(db),
            config,
        };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Create every table so later read transactions never miss one
    fn init_tables(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        for table in [ASSETS, PARTICIPANT_ASSETS, PARTICIPANTS, RATINGS, ROUNDS, COUNTERS] {
            write_txn.open_table(table).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        debug!("Initialized redb tables");
        Ok(())
    }

    /// Get a reference to the database
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbStoreConfig {
        &self.config
    }

    /// Run `f` inside one write transaction and commit it
    pub fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let value = f(&write_txn)?;
        write_txn.commit().map_err(db_err)?;
        Ok(value)
    }

    /// Put a key-value pair in a table
    pub fn put(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(table).map_err(db_err)?;
            table.insert(key, value).map_err(db_err)?;
            Ok(())
        })
    }

    /// Insert a key that must not exist yet
    pub fn insert_new(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
        what: impl FnOnce() -> String,
    ) -> Result<(), StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(table).map_err(db_err)?;
            if table.get(key).map_err(db_err)?.is_some() {
                return Err(StorageError::Duplicate(what()));
            }
            table.insert(key, value).map_err(db_err)?;
            Ok(())
        })
    }

    /// Read-modify-write one existing value in a single transaction.
    ///
    /// Returns `NotFound` when the key is absent.
    pub fn update(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        what: impl FnOnce() -> String,
        f: impl FnOnce(&[u8]) -> Result<Vec<u8>, StorageError>,
    ) -> Result<Vec<u8>, StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(table).map_err(db_err)?;
            let current = table
                .get(key)
                .map_err(db_err)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StorageError::NotFound(what()))?;
            let updated = f(&current)?;
            table.insert(key, updated.as_slice()).map_err(db_err)?;
            Ok(updated)
        })
    }

    /// Get a value from a table
    pub fn get(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(table).map_err(db_err)?;
        let value = table.get(key).map_err(db_err)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    /// Delete a key from a table
    pub fn delete(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> Result<bool, StorageError> {
        self.write(|txn| {
            let mut table = txn.open_table(table).map_err(db_err)?;
            let removed = table.remove(key).map_err(db_err)?.is_some();
            Ok(removed)
        })
    }

    /// Iterate over all entries in a table with a prefix
    pub fn scan_prefix(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        prefix: &[u8],
    ) -> Result<ScanResults, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(table).map_err(db_err)?;

        let mut results = Vec::new();
        // Use range to get all keys >= prefix
        let range = table.range(prefix..).map_err(db_err)?;
        for entry in range {
            let (key, value) = entry.map_err(db_err)?;
            let key_bytes = key.value();

            // Stop when we're past the prefix
            if !key_bytes.starts_with(prefix) {
                break;
            }
            results.push((key_bytes.to_vec(), value.value().to_vec()));
        }

        Ok(results)
    }

    /// Every value in a table, in key order
    pub fn scan_all(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        self.scan_prefix(table, &[])
            .map(|entries| entries.into_iter().map(|(_, v)| v).collect())
    }

    /// Increment a named counter inside `txn`, returning the value before
    /// the increment
    pub fn next_counter(txn: &WriteTransaction, name: &str) -> Result<u64, StorageError> {
        let mut table = txn.open_table(COUNTERS).map_err(db_err)?;
        let current = match table.get(name.as_bytes()).map_err(db_err)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .value()
                    .try_into()
                    .map_err(|_| StorageError::deserialization(format!("counter {name}")))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = (current + 1).to_be_bytes();
        table
            .insert(name.as_bytes(), next.as_slice())
            .map_err(db_err)?;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (RedbStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig::default().with_path(temp_dir.path().join("test.redb"));
        let storage = RedbStorage::open(config).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_put_get_delete() {
        let (storage, _temp) = create_test_storage();
        storage.put(PARTICIPANTS, b"a1", b"record").unwrap();
        assert_eq!(
            storage.get(PARTICIPANTS, b"a1").unwrap(),
            Some(b"record".to_vec())
        );
        assert!(storage.delete(PARTICIPANTS, b"a1").unwrap());
        assert!(storage.get(PARTICIPANTS, b"a1").unwrap().is_none());
    }

    #[test]
    fn test_insert_new_rejects_existing_key() {
        let (storage, _temp) = create_test_storage();
        storage
            .insert_new(RATINGS, b"r1\0x", b"first", || "rating".into())
            .unwrap();
        let err = storage
            .insert_new(RATINGS, b"r1\0x", b"second", || "rating".into())
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(
            storage.get(RATINGS, b"r1\0x").unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[test]
    fn test_update_missing_key() {
        let (storage, _temp) = create_test_storage();
        let err = storage
            .update(PARTICIPANTS, b"nobody", || "participant nobody".into(), |v| {
                Ok(v.to_vec())
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_scan_prefix_stops_at_boundary() {
        let (storage, _temp) = create_test_storage();
        storage
            .put(PARTICIPANT_ASSETS, &compound_key(&[b"a1", b"01"]), b"x")
            .unwrap();
        storage
            .put(PARTICIPANT_ASSETS, &compound_key(&[b"a1", b"02"]), b"y")
            .unwrap();
        storage
            .put(PARTICIPANT_ASSETS, &compound_key(&[b"a10", b"01"]), b"z")
            .unwrap();

        let entries = storage
            .scan_prefix(PARTICIPANT_ASSETS, &compound_key(&[b"a1", b""]))
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_counter_increments() {
        let (storage, _temp) = create_test_storage();
        let first = storage
            .write(|txn| RedbStorage::next_counter(txn, "asset_seq"))
            .unwrap();
        let second = storage
            .write(|txn| RedbStorage::next_counter(txn, "asset_seq"))
            .unwrap();
        assert_eq!((first, second), (0, 1));
    }
}
