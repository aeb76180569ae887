//! # Lexis Storage
//!
//! Storage backends for the Lexis story market.
//!
//! ## Features
//!
//! - **InMemoryStore**: DashMap-backed store for tests and scripted runs
//! - **RedbStore**: Persistent store on redb tables with JSON records
//! - **RoundCatalog**: Process-wide TTL cache of immutable round configs
//!
//! Both stores implement every trait in [`lexis_core::traits`], so a
//! session can be pointed at either one.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lexis_storage::{InMemoryStore, RoundCatalog, RoundCatalogConfig};
//!
//! let store = Arc::new(InMemoryStore::new());
//! store.put_round_config(round_one).await?;
//! let catalog = RoundCatalog::new(store.clone(), RoundCatalogConfig::default());
//! let round = catalog.get(1).await?;
//! ```

pub mod catalog;
pub mod error;
pub mod memory;
pub mod persistent;
pub mod tables;

pub use catalog::{RoundCatalog, RoundCatalogConfig};
pub use error::CatalogError;
pub use memory::InMemoryStore;
pub use persistent::RedbStore;
pub use tables::{RedbStorage, RedbStoreConfig};
