//! Tessera ledger service - play-money settlement for closed proposals.
//!
//! The ledger applies the financial consequence of a closed monetary
//! proposal to the shared treasury exactly once. Qualification checks are
//! ordered no-ops (expected steady states, never failures); the debit
//! itself is a storage-level atomic primitive, so repeated invocation is
//! always safe.

#![deny(unsafe_code)]

use std::sync::Arc;
use tessera_storage::{DebitOutcome, LedgerStore, ProposalStore, StorageError, TesseraStorage};
use tessera_types::{LedgerEntry, Proposal, ProposalId, ProposalStatus};
use thiserror::Error;
use tracing::{debug, error, info};

/// Result of one posting attempt.
#[derive(Clone, Debug)]
pub enum PostingOutcome {
    /// The entry was appended and the treasury debited.
    Posted(LedgerEntry),
    /// An entry for this proposal already existed; nothing changed.
    AlreadyPosted,
    /// The proposal did not qualify for settlement; nothing changed.
    Skipped(SkipReason),
}

impl PostingOutcome {
    /// True when this attempt moved the treasury.
    pub fn settled(&self) -> bool {
        matches!(self, PostingOutcome::Posted(_))
    }
}

/// Why a posting attempt was a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No proposal with the given id exists.
    Missing,
    /// Simulation-mode proposals never touch the shared treasury.
    PlayMode,
    /// Only monetary proposals settle.
    NotMonetary,
    /// The proposal has not closed yet.
    NotClosed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::Missing => "proposal not found",
            SkipReason::PlayMode => "proposal is in play mode",
            SkipReason::NotMonetary => "proposal is not monetary",
            SkipReason::NotClosed => "proposal is not closed",
        };
        write!(f, "{reason}")
    }
}

/// Outcome of a reconciliation pass over the append-only ledger.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    /// Initial treasury seed the ledger is reconciled against.
    pub seed: i64,
    /// Sum of all entry amounts.
    pub entry_total: i64,
    /// `seed + entry_total`, what the treasury should hold.
    pub expected_balance: i64,
    /// What the treasury actually holds.
    pub actual_balance: i64,
}

impl Reconciliation {
    pub fn balanced(&self) -> bool {
        self.expected_balance == self.actual_balance
    }
}

/// Ledger service errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A closed, non-play, monetary proposal is missing its amount.
    /// Retrying cannot fix missing data; the proposal record needs
    /// operator correction.
    #[error("monetary proposal {0} has no amount")]
    MissingAmount(ProposalId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Applies treasury debits for closed monetary proposals.
///
/// This is the only code path permitted to mutate the treasury balance.
pub struct LedgerService {
    storage: Arc<dyn TesseraStorage>,
}

impl LedgerService {
    pub fn new(storage: Arc<dyn TesseraStorage>) -> Self {
        Self { storage }
    }

    /// Post the treasury debit for a proposal, exactly once.
    ///
    /// Qualification checks run in order and each failure is a logged
    /// no-op. Repeated invocation for the same proposal is safe: the
    /// storage primitive skips when an entry already exists.
    pub async fn post_ledger_entry(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<PostingOutcome, LedgerError> {
        let proposal = match self.storage.get_proposal(proposal_id).await? {
            Some(proposal) => proposal,
            None => return Ok(self.skip(proposal_id, SkipReason::Missing)),
        };

        if let Some(reason) = disqualification(&proposal) {
            return Ok(self.skip(proposal_id, reason));
        }

        let amount = match proposal.amount {
            Some(amount) => amount,
            None => {
                error!(
                    proposal_id = %proposal_id,
                    "closed monetary proposal has no amount; posting aborted"
                );
                return Err(LedgerError::MissingAmount(proposal_id.clone()));
            }
        };

        match self.storage.post_debit(proposal_id, amount).await {
            Ok(DebitOutcome::Applied(entry)) => {
                info!(
                    proposal_id = %proposal_id,
                    amount = entry.amount,
                    balance_after = entry.balance_after,
                    "Ledger entry posted"
                );
                Ok(PostingOutcome::Posted(entry))
            }
            Ok(DebitOutcome::AlreadyPosted) => {
                debug!(proposal_id = %proposal_id, "Ledger entry already exists; no-op");
                Ok(PostingOutcome::AlreadyPosted)
            }
            Err(StorageError::ConfigMissing) => {
                error!(
                    proposal_id = %proposal_id,
                    "treasury singleton missing; cannot post ledger entry"
                );
                Err(StorageError::ConfigMissing.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Recompute `seed + sum(entries)` and compare against the live
    /// treasury balance.
    pub async fn reconcile(&self, seed: i64) -> Result<Reconciliation, LedgerError> {
        let entries = self.storage.ledger_entries().await?;
        let entry_total: i64 = entries.iter().map(|e| e.amount).sum();
        let actual_balance = self.storage.treasury_balance().await?;
        Ok(Reconciliation {
            seed,
            entry_total,
            expected_balance: seed + entry_total,
            actual_balance,
        })
    }

    /// Current authoritative treasury balance.
    pub async fn treasury_balance(&self) -> Result<i64, LedgerError> {
        Ok(self.storage.treasury_balance().await?)
    }

    /// The settled entry for a proposal, if any.
    pub async fn entry_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.storage.entry_for_proposal(proposal_id).await?)
    }

    /// Every ledger entry in append order.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.storage.ledger_entries().await?)
    }

    fn skip(&self, proposal_id: &ProposalId, reason: SkipReason) -> PostingOutcome {
        debug!(proposal_id = %proposal_id, reason = %reason, "Ledger posting skipped");
        PostingOutcome::Skipped(reason)
    }
}

/// First disqualifying condition in check order, if any. The amount check
/// is separate because a missing amount is a validation failure, not an
/// expected steady state.
fn disqualification(proposal: &Proposal) -> Option<SkipReason> {
    if proposal.play_mode {
        Some(SkipReason::PlayMode)
    } else if !proposal.is_monetary() {
        Some(SkipReason::NotMonetary)
    } else if proposal.status != ProposalStatus::Closed {
        Some(SkipReason::NotClosed)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tessera_storage::memory::InMemoryStorage;
    use tessera_types::Proposal;

    const SEED: i64 = 100_000;

    async fn setup() -> (LedgerService, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        storage.seed_treasury(SEED).await.unwrap();
        (LedgerService::new(storage.clone()), storage)
    }

    async fn closed_monetary(storage: &InMemoryStorage, amount: i64) -> ProposalId {
        let mut proposal = Proposal::monetary("Water-Treatment Plant Funding Gap", amount);
        proposal.close(Utc::now());
        let id = proposal.id.clone();
        storage.create_proposal(proposal).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_posting_debits_exactly_once() {
        let (ledger, storage) = setup().await;
        let id = closed_monetary(&storage, 500).await;

        let outcome = ledger.post_ledger_entry(&id).await.unwrap();
        let entry = match outcome {
            PostingOutcome::Posted(entry) => entry,
            other => panic!("expected Posted, got {other:?}"),
        };
        assert_eq!(entry.amount, -500);
        assert_eq!(entry.balance_after, 99_500);
        assert_eq!(ledger.treasury_balance().await.unwrap(), 99_500);

        // Second posting is a no-op and moves nothing.
        let repeat = ledger.post_ledger_entry(&id).await.unwrap();
        assert!(matches!(repeat, PostingOutcome::AlreadyPosted));
        assert_eq!(ledger.treasury_balance().await.unwrap(), 99_500);
        assert_eq!(ledger.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_proposal_is_a_noop() {
        let (ledger, _storage) = setup().await;
        let outcome = ledger
            .post_ledger_entry(&ProposalId::new("nope"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            PostingOutcome::Skipped(SkipReason::Missing)
        ));
        assert_eq!(ledger.treasury_balance().await.unwrap(), SEED);
    }

    #[tokio::test]
    async fn test_play_mode_never_settles() {
        let (ledger, storage) = setup().await;
        let mut proposal = Proposal::monetary("Sandbox spend", 500).with_play_mode(true);
        proposal.close(Utc::now());
        let id = proposal.id.clone();
        storage.create_proposal(proposal).await.unwrap();

        let outcome = ledger.post_ledger_entry(&id).await.unwrap();
        assert!(matches!(
            outcome,
            PostingOutcome::Skipped(SkipReason::PlayMode)
        ));
        assert!(ledger.entries().await.unwrap().is_empty());
        assert_eq!(ledger.treasury_balance().await.unwrap(), SEED);
    }

    #[tokio::test]
    async fn test_policy_proposal_never_settles() {
        let (ledger, storage) = setup().await;
        let mut proposal = Proposal::new("Zoning change");
        proposal.close(Utc::now());
        let id = proposal.id.clone();
        storage.create_proposal(proposal).await.unwrap();

        let outcome = ledger.post_ledger_entry(&id).await.unwrap();
        assert!(matches!(
            outcome,
            PostingOutcome::Skipped(SkipReason::NotMonetary)
        ));
        assert_eq!(ledger.treasury_balance().await.unwrap(), SEED);
    }

    #[tokio::test]
    async fn test_open_proposal_never_settles() {
        let (ledger, storage) = setup().await;
        let proposal = Proposal::monetary("Still open", 500);
        let id = proposal.id.clone();
        storage.create_proposal(proposal).await.unwrap();

        let outcome = ledger.post_ledger_entry(&id).await.unwrap();
        assert!(matches!(
            outcome,
            PostingOutcome::Skipped(SkipReason::NotClosed)
        ));
        assert_eq!(ledger.treasury_balance().await.unwrap(), SEED);
    }

    #[tokio::test]
    async fn test_missing_amount_is_validation_fatal() {
        let (ledger, storage) = setup().await;
        let mut proposal = Proposal::monetary("Broken record", 0);
        proposal.amount = None;
        proposal.close(Utc::now());
        let id = proposal.id.clone();
        storage.create_proposal(proposal).await.unwrap();

        let err = ledger.post_ledger_entry(&id).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingAmount(_)));
        assert!(ledger.entries().await.unwrap().is_empty());
        assert_eq!(ledger.treasury_balance().await.unwrap(), SEED);
    }

    #[tokio::test]
    async fn test_missing_config_is_fatal() {
        let storage = Arc::new(InMemoryStorage::new());
        let ledger = LedgerService::new(storage.clone());
        let id = closed_monetary(&storage, 500).await;

        let err = ledger.post_ledger_entry(&id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(StorageError::ConfigMissing)));
        assert!(ledger.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconciliation_holds_across_postings() {
        let (ledger, storage) = setup().await;
        for amount in [500, 1_250, 99] {
            let id = closed_monetary(&storage, amount).await;
            ledger.post_ledger_entry(&id).await.unwrap();
        }

        let report = ledger.reconcile(SEED).await.unwrap();
        assert!(report.balanced());
        assert_eq!(report.entry_total, -(500 + 1_250 + 99));
        assert_eq!(report.actual_balance, SEED - 500 - 1_250 - 99);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Reconciliation must hold for any sequence of posted amounts,
            // including repeated posting attempts.
            #[test]
            fn prop_ledger_reconciles(amounts in proptest::collection::vec(1i64..50_000, 0..16)) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    let (ledger, storage) = setup().await;
                    for amount in &amounts {
                        let id = closed_monetary(&storage, *amount).await;
                        ledger.post_ledger_entry(&id).await.unwrap();
                        // Redundant attempt; must not double-apply.
                        ledger.post_ledger_entry(&id).await.unwrap();
                    }
                    let report = ledger.reconcile(SEED).await.unwrap();
                    prop_assert!(report.balanced());
                    prop_assert_eq!(
                        report.actual_balance,
                        SEED - amounts.iter().sum::<i64>()
                    );
                    Ok(())
                })?;
            }
        }
    }
}
