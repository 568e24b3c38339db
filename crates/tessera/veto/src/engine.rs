//! Veto window engine: pending-review discovery and human overrides.

use crate::signature::SignatureVerifier;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tessera_storage::{
    AgentStore, PendingReview, ProposalStore, StorageError, TesseraStorage, UserStore, VoteStore,
};
use tessera_types::{AgentId, ProposalId, ProposalStatus, UserId, Vote};
use thiserror::Error;
use tracing::{info, warn};

/// An authenticated request to override the agent's vote on a proposal.
///
/// `body` is the exact serialized request the human signed; `signature`
/// is the detached signature over those bytes.
#[derive(Clone, Debug)]
pub struct OverrideRequest {
    pub user_id: UserId,
    pub proposal_id: ProposalId,
    pub reason: Option<String>,
    pub body: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Veto engine errors. Authentication failures reject at this boundary;
/// they never become ledger or digest events.
#[derive(Debug, Error)]
pub enum VetoError {
    #[error("signature verification failed for user {0}")]
    SignatureRejected(UserId),

    #[error("user {0} is not registered")]
    UnknownUser(UserId),

    #[error("user {0} has no agent")]
    NoAgent(UserId),

    #[error("proposal {0} not found")]
    ProposalNotFound(ProposalId),

    #[error("proposal {0} is closed; overrides are no longer accepted")]
    ProposalClosed(ProposalId),

    #[error("agent {agent} has no vote on proposal {proposal}")]
    VoteNotFound { agent: AgentId, proposal: ProposalId },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The state machine over (proposal deadline, override flag), exposed as
/// two operations: review discovery and the override transition.
pub struct VetoWindowEngine {
    storage: Arc<dyn TesseraStorage>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl VetoWindowEngine {
    pub fn new(storage: Arc<dyn TesseraStorage>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { storage, verifier }
    }

    /// Open proposals whose veto deadline falls inside
    /// `[now, now + lookahead]` (inclusive on both ends) and that carry a
    /// non-overridden vote from the agent, soonest deadline first.
    pub async fn pending_review(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> Result<Vec<PendingReview>, VetoError> {
        Ok(self
            .storage
            .pending_review(agent_id, now, now + lookahead)
            .await?)
    }

    /// Apply a human override to the agent's vote on a proposal.
    ///
    /// Accepted any time before the proposal closes, even after the veto
    /// deadline; the deadline only changes the derived CAST/FINAL label.
    pub async fn override_vote(&self, request: OverrideRequest) -> Result<Vote, VetoError> {
        if !self
            .verifier
            .verify(&request.user_id, &request.body, &request.signature)
        {
            warn!(
                user_id = %request.user_id,
                proposal_id = %request.proposal_id,
                "Override rejected: signature verification failed"
            );
            return Err(VetoError::SignatureRejected(request.user_id));
        }

        let user = self
            .storage
            .get_user(&request.user_id)
            .await?
            .ok_or_else(|| VetoError::UnknownUser(request.user_id.clone()))?;

        let agent = self
            .storage
            .agent_for_user(&user.id)
            .await?
            .ok_or_else(|| VetoError::NoAgent(user.id.clone()))?;

        let proposal = self
            .storage
            .get_proposal(&request.proposal_id)
            .await?
            .ok_or_else(|| VetoError::ProposalNotFound(request.proposal_id.clone()))?;

        if proposal.status != ProposalStatus::Open {
            return Err(VetoError::ProposalClosed(proposal.id));
        }

        // First match wins; the data model does not promise one vote per
        // (agent, proposal).
        let vote = self
            .storage
            .find_agent_vote(&proposal.id, &agent.id)
            .await?
            .ok_or_else(|| VetoError::VoteNotFound {
                agent: agent.id.clone(),
                proposal: proposal.id.clone(),
            })?;

        let updated = self
            .storage
            .set_override(&vote.id, request.reason)
            .await?;

        info!(
            user_id = %user.id,
            agent_id = %agent.id,
            proposal_id = %proposal.id,
            vote_id = %updated.id,
            "Vote overridden by user"
        );

        Ok(updated)
    }
}
