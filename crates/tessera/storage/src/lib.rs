//! Tessera storage boundary.
//!
//! This crate defines the storage contract consumed by the ledger, veto,
//! and digest services:
//! - per-aggregate trait boundaries (proposals, votes, agents, users,
//!   digests, ledger)
//! - an in-memory adapter for tests and local runtime use
//! - a PostgreSQL adapter behind the `postgres` feature
//!
//! Design stance:
//! - The storage handle is passed explicitly to every component; there is
//!   no process-wide client.
//! - The exactly-once treasury debit is a storage-level primitive so each
//!   backend enforces atomicity with its native mechanism (one write lock
//!   in memory, one row-locked transaction in Postgres).

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{DebitOutcome, PendingReview, VoteActivity};
pub use traits::{
    AgentStore, DigestStore, LedgerStore, ProposalStore, TesseraStorage, UserStore, VoteStore,
};
