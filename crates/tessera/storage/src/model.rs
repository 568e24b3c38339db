use serde::{Deserialize, Serialize};
use tessera_types::{LedgerEntry, Proposal, Vote};

/// A vote joined with the proposal it was cast on, for digest aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteActivity {
    pub vote: Vote,
    pub proposal: Proposal,
}

/// An open proposal whose veto deadline falls inside the queried window,
/// paired with the subject agent's first matching non-overridden vote.
///
/// Callers must tolerate the vote being one of several the agent cast on
/// the same proposal; uniqueness is not enforced by the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    pub proposal: Proposal,
    pub vote: Vote,
}

/// Result of the atomic treasury debit primitive.
#[derive(Debug, Clone)]
pub enum DebitOutcome {
    /// The entry was appended and the treasury moved.
    Applied(LedgerEntry),
    /// An entry for this proposal already existed; nothing changed.
    AlreadyPosted,
}
