//! Durable participant record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ParticipantId;
use crate::money::Money;

/// A participant as stored by the participant repository.
///
/// `balance` is only written by a successful ledger flush or a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub balance: Money,
    pub current_round: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Participant {
    /// Fresh participant starting a round with the given balance
    pub fn new(id: ParticipantId, current_round: u32, balance: Money) -> Self {
        Self {
            id,
            balance: balance.rounded(),
            current_round,
            active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }
}
