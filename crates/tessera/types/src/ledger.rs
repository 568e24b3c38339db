//! Play-money ledger types.
//!
//! The ledger is append-only: at most one entry per proposal, ever, and
//! each entry records the treasury balance immediately after it applied.
//! The SystemConfig singleton holds the current authoritative balance and
//! is only ever mutated inside the transaction that appends an entry.

use crate::ProposalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The one legal id for the SystemConfig row
pub const SYSTEM_CONFIG_ID: i64 = 1;

/// Unique identifier for a ledger entry
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntryId(pub String);

impl LedgerEntryId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One applied treasury movement. Negative `amount` is a debit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry identity
    pub id: LedgerEntryId,
    /// The proposal that settled; unique across the ledger
    pub proposal_id: ProposalId,
    /// Signed movement applied to the treasury
    pub amount: i64,
    /// Treasury balance immediately after this entry
    pub balance_after: i64,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(proposal_id: ProposalId, amount: i64, balance_after: i64) -> Self {
        Self {
            id: LedgerEntryId::generate(),
            proposal_id,
            amount,
            balance_after,
            created_at: Utc::now(),
        }
    }
}

/// Singleton configuration row holding the authoritative treasury balance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Always `SYSTEM_CONFIG_ID`
    pub id: i64,
    /// Current play-money treasury balance
    pub play_money_treasury: i64,
}

impl SystemConfig {
    pub fn seeded(play_money_treasury: i64) -> Self {
        Self {
            id: SYSTEM_CONFIG_ID,
            play_money_treasury,
        }
    }
}
