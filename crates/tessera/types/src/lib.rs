//! Tessera domain types
//!
//! A delegated civic agent is NOT an autonomous decision-maker.
//! It votes on behalf of exactly one human, inside a bounded veto window,
//! and every monetary consequence lands on a shared play-money treasury
//! through an append-only ledger.

#![deny(unsafe_code)]

mod delegate;
mod digest;
mod ledger;
mod proposal;
mod vote;

pub use delegate::{Agent, AgentId, DigestTone, User, UserId};
pub use digest::{Digest, DigestId};
pub use ledger::{LedgerEntry, LedgerEntryId, SystemConfig, SYSTEM_CONFIG_ID};
pub use proposal::{Proposal, ProposalId, ProposalStatus, ProposalType};
pub use vote::{Vote, VoteId, VoteValue};
