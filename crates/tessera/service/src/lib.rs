//! Tessera Service - the unified delegated-governance facade.
//!
//! Wires the storage handle, ledger service, veto window engine, and
//! digest pipeline behind one constructor. The proposal-close trigger
//! lives here: closing a proposal stamps its lifecycle and invokes the
//! ledger posting, whose internal guard makes repeated invocation safe.

#![deny(unsafe_code)]

use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tessera_digest::{
    DigestError, DigestJob, DigestRenderer, DigestWorker, InMemoryJobQueue, JobQueue, JobResult,
    TemplateRenderer,
};
use tessera_ledger::{LedgerError, LedgerService, PostingOutcome};
use tessera_storage::{
    AgentStore, PendingReview, ProposalStore, StorageError, TesseraStorage, UserStore, VoteStore,
};
use tessera_types::{
    Agent, AgentId, Proposal, ProposalId, ProposalStatus, User, UserId, Vote, VoteValue,
};
use tessera_veto::{OverrideRequest, SignatureVerifier, VetoError, VetoWindowEngine};
use thiserror::Error;
use tracing::info;

/// Unified service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user {0} is not registered")]
    UnknownUser(UserId),

    #[error("agent {0} is not registered")]
    UnknownAgent(AgentId),

    #[error("proposal {0} not found")]
    ProposalNotFound(ProposalId),

    #[error("proposal {0} is closed; votes are no longer accepted")]
    ProposalClosed(ProposalId),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("veto error: {0}")]
    Veto(#[from] VetoError),

    #[error("digest error: {0}")]
    Digest(#[from] DigestError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The delegated-governance service.
pub struct TesseraService {
    storage: Arc<dyn TesseraStorage>,
    ledger: Arc<LedgerService>,
    veto: Arc<VetoWindowEngine>,
    worker: Arc<DigestWorker>,
    queue: Arc<dyn JobQueue>,
}

impl TesseraService {
    /// Create a service over any storage handle with default renderer and
    /// an in-process job queue.
    pub fn new(storage: Arc<dyn TesseraStorage>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self::with_components(
            storage,
            verifier,
            Arc::new(TemplateRenderer::new()),
            Arc::new(InMemoryJobQueue::new()),
        )
    }

    /// Create with custom renderer and queue implementations.
    pub fn with_components(
        storage: Arc<dyn TesseraStorage>,
        verifier: Arc<dyn SignatureVerifier>,
        renderer: Arc<dyn DigestRenderer>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            ledger: Arc::new(LedgerService::new(storage.clone())),
            veto: Arc::new(VetoWindowEngine::new(storage.clone(), verifier)),
            worker: Arc::new(DigestWorker::new(storage.clone(), renderer)),
            queue,
            storage,
        }
    }

    // ============ Onboarding ============

    /// Register a new user.
    pub async fn register_user(&self, user: User) -> Result<User, ServiceError> {
        self.storage.create_user(user.clone()).await?;
        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Provision the user's delegated agent (1:1).
    pub async fn create_agent(
        &self,
        user_id: &UserId,
        nickname: impl Into<String>,
        preferences: Value,
    ) -> Result<Agent, ServiceError> {
        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::UnknownUser(user_id.clone()))?;

        let agent = Agent::new(user.id, nickname).with_preferences(preferences);
        self.storage.create_agent(agent.clone()).await?;
        info!(agent_id = %agent.id, user_id = %agent.user_id, "Agent provisioned");
        Ok(agent)
    }

    /// Replace an agent's preference document.
    pub async fn update_agent_preferences(
        &self,
        agent_id: &AgentId,
        preferences: Value,
    ) -> Result<Agent, ServiceError> {
        Ok(self
            .storage
            .update_agent_preferences(agent_id, preferences)
            .await?)
    }

    // ============ Proposals and votes ============

    /// Publish a new proposal.
    pub async fn create_proposal(&self, proposal: Proposal) -> Result<Proposal, ServiceError> {
        self.storage.create_proposal(proposal.clone()).await?;
        info!(proposal_id = %proposal.id, title = %proposal.title, "Proposal created");
        Ok(proposal)
    }

    /// Record the agent's vote on an open proposal.
    pub async fn cast_vote(
        &self,
        agent_id: &AgentId,
        proposal_id: &ProposalId,
        value: VoteValue,
        confidence: f64,
    ) -> Result<Vote, ServiceError> {
        let agent = self
            .storage
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| ServiceError::UnknownAgent(agent_id.clone()))?;

        let proposal = self
            .storage
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| ServiceError::ProposalNotFound(proposal_id.clone()))?;
        if proposal.status != ProposalStatus::Open {
            return Err(ServiceError::ProposalClosed(proposal.id));
        }

        let vote = Vote::new(proposal.id.clone(), agent.id.clone(), value, confidence);
        self.storage.record_vote(vote.clone()).await?;
        info!(
            vote_id = %vote.id,
            agent_id = %agent.id,
            proposal_id = %proposal.id,
            "Vote cast"
        );
        Ok(vote)
    }

    /// Close a proposal and settle its monetary effect.
    ///
    /// Callers invoke this once per transition to closed, but the
    /// ledger's idempotency guard makes repeated invocation safe.
    pub async fn close_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<(Proposal, PostingOutcome), ServiceError> {
        let proposal = self.storage.close_proposal(proposal_id, Utc::now()).await?;
        info!(proposal_id = %proposal.id, "Proposal closed");

        let outcome = self.ledger.post_ledger_entry(proposal_id).await?;
        Ok((proposal, outcome))
    }

    // ============ Veto window ============

    /// Proposals needing the user's review inside the lookahead horizon.
    pub async fn pending_review(
        &self,
        agent_id: &AgentId,
        lookahead: Duration,
    ) -> Result<Vec<PendingReview>, ServiceError> {
        Ok(self.veto.pending_review(agent_id, Utc::now(), lookahead).await?)
    }

    /// Apply an authenticated human override.
    pub async fn override_vote(&self, request: OverrideRequest) -> Result<Vote, ServiceError> {
        Ok(self.veto.override_vote(request).await?)
    }

    // ============ Digests ============

    /// Enqueue a digest job for a user.
    pub async fn enqueue_digest(&self, user_id: &UserId) -> Result<(), ServiceError> {
        self.queue
            .enqueue(DigestJob::new(user_id.clone()))
            .await
            .map_err(DigestError::from)?;
        Ok(())
    }

    /// Generate a user's digest inline (bypassing the queue).
    pub async fn run_digest_job(&self, user_id: &UserId) -> Result<JobResult, ServiceError> {
        Ok(self.worker.process(&DigestJob::new(user_id.clone())).await?)
    }

    // ============ Component access ============

    pub fn storage(&self) -> &Arc<dyn TesseraStorage> {
        &self.storage
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn veto(&self) -> &VetoWindowEngine {
        &self.veto
    }

    pub fn digest_worker(&self) -> &DigestWorker {
        &self.worker
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }
}
