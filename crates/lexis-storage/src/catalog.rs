//! Round catalog
//!
//! Process-wide cache of round configurations. A round is loaded from its
//! [`RoundConfigSource`] on first use, checked for integrity and shared as
//! an immutable `Arc<RoundConfig>`. Entries only expire by TTL.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lexis_core::{RoundConfig, RoundConfigSource};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::error::CatalogError;

/// Default freshness window for a cached round
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(300);

/// Configuration for [`RoundCatalog`]
#[derive(Debug, Clone)]
pub struct RoundCatalogConfig {
    /// How long a loaded round is served before it is fetched again
    pub ttl: Duration,
}

impl Default for RoundCatalogConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CATALOG_TTL,
        }
    }
}

impl RoundCatalogConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Clone)]
struct CachedRound {
    config: Arc<RoundConfig>,
    loaded_at: Instant,
}

/// TTL cache in front of a round config source
pub struct RoundCatalog {
    source: Arc<dyn RoundConfigSource>,
    entries: DashMap<u32, CachedRound>,
    config: RoundCatalogConfig,
}

impl RoundCatalog {
    pub fn new(source: Arc<dyn RoundConfigSource>, config: RoundCatalogConfig) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            config,
        }
    }

    /// Get a round, loading it if it is not cached or has expired
    #[instrument(skip(self))]
    pub async fn get(&self, round: u32) -> Result<Arc<RoundConfig>, CatalogError> {
        if let Some(config) = self.fresh(round) {
            return Ok(config);
        }

        let loaded = self
            .source
            .load_round_config(round)
            .await?
            .ok_or(CatalogError::UnknownRound(round))?;

        let faults = loaded.check_integrity();
        if RoundConfig::is_fatal(&faults) {
            error!(round, faults = faults.len(), "Refusing corrupt round configuration");
            return Err(CatalogError::Configuration { round, faults });
        }
        for fault in &faults {
            warn!(round, %fault, "Round configuration fault");
        }

        let config = Arc::new(loaded);
        self.entries.insert(
            round,
            CachedRound {
                config: Arc::clone(&config),
                loaded_at: Instant::now(),
            },
        );
        debug!(round, "Cached round configuration");
        Ok(config)
    }

    /// Cached config if still inside the TTL window
    fn fresh(&self, round: u32) -> Option<Arc<RoundConfig>> {
        let entry = self.entries.get(&round)?;
        (entry.loaded_at.elapsed() < self.config.ttl).then(|| Arc::clone(&entry.config))
    }

    /// Number of rounds currently held, fresh or not
    pub fn cached_rounds(&self) -> usize {
        self.entries.len()
    }

    pub fn config(&self) -> &RoundCatalogConfig {
        &self.config
    }
}
