//! # Lexis Ledger
//!
//! Optimistic participant sessions with an exactly-once transaction ledger.
//!
//! A [`Session`] applies every accepted purchase, draw, draft, and submission
//! to local state at once and queues it on its [`Ledger`]. Flushing writes
//! the queue to an [`ExperimentStore`](lexis_core::ExperimentStore) in order,
//! skipping entries whose effect is already durable, so a flush interrupted
//! by a timeout can simply be run again.
//!
//! ## Example
//!
//! ```ignore
//! let session = Session::open(participant, 1, deps, SessionConfig::default()).await?;
//! session.purchase_bundle(&BundleId::from("ca1")).await?;
//! session.submit("The cat sat. A dog ran.", 1.5).await?;
//! ```

pub mod config;
pub mod error;
pub mod flush_task;
pub mod ledger;
pub mod session;
pub mod state;
pub mod transaction;
pub mod transfer;

pub use config::SessionConfig;
pub use error::SessionError;
pub use flush_task::{IdleFlushTask, SessionMap};
pub use ledger::{DurableSnapshot, FlushOutcome, Flusher, Ledger};
pub use session::{
    DrawnWord, FlushStatus, Session, SessionDeps, SessionResult, StagedSubmission,
};
pub use state::ParticipantState;
pub use transaction::{DedupKey, LedgerEntry, Transaction};
pub use transfer::{TransferReceipt, transfer_story_content};
