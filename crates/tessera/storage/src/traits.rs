use crate::model::{DebitOutcome, PendingReview, VoteActivity};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tessera_types::{
    Agent, AgentId, Digest, LedgerEntry, Proposal, ProposalId, User, UserId, Vote, VoteId,
};

/// Storage interface for proposal lifecycle records.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert a new proposal.
    async fn create_proposal(&self, proposal: Proposal) -> StorageResult<()>;

    /// Get one proposal by id.
    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<Option<Proposal>>;

    /// Transition an open proposal to closed, stamping `close_at`.
    async fn close_proposal(
        &self,
        proposal_id: &ProposalId,
        at: DateTime<Utc>,
    ) -> StorageResult<Proposal>;

    /// Proposals created inside `[from, to]`, newest-first.
    async fn proposals_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Proposal>>;

    /// Open proposals with a veto deadline inside `[from, until]` (both
    /// bounds inclusive) carrying at least one non-overridden vote from
    /// the agent, soonest deadline first. This query is the only
    /// supported discovery path for pending vetoes; there is no
    /// denormalized flag to drift from the deadline and override fields.
    async fn pending_review(
        &self,
        agent_id: &AgentId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<PendingReview>>;
}

/// Storage interface for votes.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Insert a newly cast vote.
    async fn record_vote(&self, vote: Vote) -> StorageResult<()>;

    /// Get one vote by id.
    async fn get_vote(&self, vote_id: &VoteId) -> StorageResult<Option<Vote>>;

    /// First vote the agent cast on the proposal, if any. Zero or more
    /// matches may exist; callers must not assume uniqueness.
    async fn find_agent_vote(
        &self,
        proposal_id: &ProposalId,
        agent_id: &AgentId,
    ) -> StorageResult<Option<Vote>>;

    /// Flip `override_by_user` on and store the human's reason.
    async fn set_override(
        &self,
        vote_id: &VoteId,
        reason: Option<String>,
    ) -> StorageResult<Vote>;

    /// The agent's votes cast inside `[from, to]` with their proposals
    /// joined, newest-first.
    async fn votes_for_agent_between(
        &self,
        agent_id: &AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<VoteActivity>>;
}

/// Storage interface for delegated agents.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create_agent(&self, agent: Agent) -> StorageResult<()>;
    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<Option<Agent>>;
    /// The user's agent, if onboarding has created one (1:1 ownership).
    async fn agent_for_user(&self, user_id: &UserId) -> StorageResult<Option<Agent>>;
    /// Replace the preference document and bump `updated_at`.
    async fn update_agent_preferences(
        &self,
        agent_id: &AgentId,
        preferences: Value,
    ) -> StorageResult<Agent>;
}

/// Storage interface for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: User) -> StorageResult<()>;
    async fn get_user(&self, user_id: &UserId) -> StorageResult<Option<User>>;
    /// All registered users, registration order. Used by the digest
    /// scheduler to fan out jobs.
    async fn list_users(&self) -> StorageResult<Vec<User>>;
}

/// Storage interface for digests. Digest rows are append-only.
#[async_trait]
pub trait DigestStore: Send + Sync {
    async fn insert_digest(&self, digest: Digest) -> StorageResult<()>;
    /// The user's digests, newest-first.
    async fn digests_for_user(&self, user_id: &UserId) -> StorageResult<Vec<Digest>>;
}

/// Storage interface for the play-money ledger and treasury singleton.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Seed (or reset) the SystemConfig singleton with an initial balance.
    async fn seed_treasury(&self, balance: i64) -> StorageResult<()>;

    /// Current authoritative treasury balance.
    async fn treasury_balance(&self) -> StorageResult<i64>;

    /// Atomically debit `amount` from the treasury for `proposal_id`:
    /// skip if an entry for the proposal already exists, read the
    /// balance, append the entry with `amount` negated and the resulting
    /// balance, and update the singleton. All steps commit or roll back
    /// together; concurrent callers serialize on the config row.
    async fn post_debit(
        &self,
        proposal_id: &ProposalId,
        amount: i64,
    ) -> StorageResult<DebitOutcome>;

    /// The entry for a proposal, if it has settled.
    async fn entry_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> StorageResult<Option<LedgerEntry>>;

    /// Every ledger entry in append order.
    async fn ledger_entries(&self) -> StorageResult<Vec<LedgerEntry>>;
}

/// Unified storage bundle consumed by Tessera services.
pub trait TesseraStorage:
    ProposalStore + VoteStore + AgentStore + UserStore + DigestStore + LedgerStore + Send + Sync
{
}

impl<T> TesseraStorage for T where
    T: ProposalStore + VoteStore + AgentStore + UserStore + DigestStore + LedgerStore + Send + Sync
{
}
