//! Error types for lexis-storage

use lexis_core::{ConfigFault, StorageError};
use thiserror::Error;

/// Errors returned by the round catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No configuration stored for this round
    #[error("Unknown round: {0}")]
    UnknownRound(u32),

    /// The stored configuration is internally inconsistent
    #[error("Round {round} configuration is corrupt: {}", join_faults(.faults))]
    Configuration { round: u32, faults: Vec<ConfigFault> },

    /// The backing store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

fn join_faults(faults: &[ConfigFault]) -> String {
    faults
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CatalogError {
    /// Whether the error points at corrupt round data rather than I/O
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            CatalogError::Configuration { .. } | CatalogError::UnknownRound(_)
        )
    }
}
