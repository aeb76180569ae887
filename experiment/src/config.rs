//! Command line and configuration file

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lexis_ledger::SessionConfig;
use lexis_logging::LogConfig;
use lexis_storage::{RedbStoreConfig, RoundCatalogConfig};
use serde::{Deserialize, Serialize};

/// Experiment configuration loaded from TOML. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub storage: StorageSection,
    pub catalog: CatalogSection,
    pub session: SessionSection,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub db_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: RedbStoreConfig::default().db_path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub ttl_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            ttl_secs: RoundCatalogConfig::default().ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub idle_flush_after_secs: u64,
    pub store_timeout_ms: u64,
    pub draft_retention: usize,
    pub rater_license_rate: f64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            idle_flush_after_secs: defaults.idle_flush_after.as_secs(),
            store_timeout_ms: defaults.store_timeout.as_millis() as u64,
            draft_retention: defaults.draft_retention,
            rater_license_rate: defaults.rater_license_rate,
        }
    }
}

impl ExperimentConfig {
    /// Read a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn store_config(&self) -> RedbStoreConfig {
        RedbStoreConfig::default().with_path(&self.storage.db_path)
    }

    pub fn catalog_config(&self) -> RoundCatalogConfig {
        RoundCatalogConfig::default().with_ttl(Duration::from_secs(self.catalog.ttl_secs))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_idle_flush_after(Duration::from_secs(self.session.idle_flush_after_secs))
            .with_store_timeout(Duration::from_millis(self.session.store_timeout_ms))
            .with_draft_retention(self.session.draft_retention)
            .with_rater_license_rate(self.session.rater_license_rate)
    }
}

#[derive(Parser)]
#[command(name = "lexis", about = "Lexis story market experiment")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level console logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Participant and round shared by session commands
#[derive(Debug, Clone, clap::Args)]
pub struct Who {
    /// Participant id
    #[arg(long, short)]
    pub participant: String,
    /// Round number
    #[arg(long, short, default_value_t = 1)]
    pub round: u32,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a round configuration from a JSON file
    Seed {
        /// Round JSON file
        file: PathBuf,
    },
    /// Show balance, owned words, and draft
    Status {
        #[command(flatten)]
        who: Who,
    },
    /// List bundles with prices for a participant
    Market {
        #[command(flatten)]
        who: Who,
    },
    /// Buy every word of a bundle
    BuyBundle {
        #[command(flatten)]
        who: Who,
        bundle: String,
    },
    /// Buy a bundled story
    BuyStory {
        #[command(flatten)]
        who: Who,
        bundle: String,
        story: String,
    },
    /// Draw a random unowned word
    Draw {
        #[command(flatten)]
        who: Who,
    },
    /// Save draft text
    Draft {
        #[command(flatten)]
        who: Who,
        content: String,
    },
    /// Validate and submit a story
    Submit {
        #[command(flatten)]
        who: Who,
        content: String,
        /// License rate charged when others buy this story
        #[arg(long, default_value_t = 1.5)]
        license_rate: f64,
    },
    /// List stories awaiting this participant's rating
    ToRate {
        #[command(flatten)]
        who: Who,
    },
    /// Rate a submitted story (scores 1 to 7)
    Rate {
        #[command(flatten)]
        who: Who,
        asset: String,
        creativity: u8,
        coherence: u8,
        overall: u8,
    },
    /// Pass a purchased story to another participant
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        asset: String,
    },
    /// Build the next round from this round's rated submissions
    NextRound {
        /// Round whose submissions are carried forward
        #[arg(long, short, default_value_t = 1)]
        round: u32,
        /// Write the new round JSON here
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Store the new round as well
        #[arg(long)]
        publish: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config: ExperimentConfig =
            toml::from_str(include_str!("../lexis.toml")).unwrap();
        assert_eq!(config.catalog.ttl_secs, 300);
        assert_eq!(config.session.draft_retention, 5);
        assert!(config.logging.console.pretty);

        let session = config.session_config();
        assert_eq!(session.store_timeout, Duration::from_secs(5));
        assert_eq!(session.rater_license_rate, 2.0);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ExperimentConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("./data/lexis.redb"));
        assert_eq!(config.catalog_config().ttl, Duration::from_secs(300));
        assert_eq!(config.session_config().idle_flush_after, Duration::from_secs(120));
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "lexis", "buy-bundle", "-p", "alice", "ca1", "--config", "x.toml", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command {
            Command::BuyBundle { who, bundle } => {
                assert_eq!(who.participant, "alice");
                assert_eq!(who.round, 1);
                assert_eq!(bundle, "ca1");
            }
            _ => panic!("wrong command"),
        }
    }
}
