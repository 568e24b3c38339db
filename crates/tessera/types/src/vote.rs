//! Vote types: an agent's recorded position on a proposal.

use crate::{AgentId, ProposalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a Vote
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteId(pub String);

impl VoteId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for VoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position taken by the agent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteValue {
    Approve,
    Reject,
    Abstain,
}

/// A vote cast by a delegated agent on behalf of its human.
///
/// The CAST/FINAL/OVERRIDDEN state is not stored; it is derived from
/// `override_by_user` and the proposal's veto deadline at read time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    /// Unique vote identity
    pub id: VoteId,
    /// The proposal this vote belongs to
    pub proposal_id: ProposalId,
    /// The agent that cast it
    pub agent_id: AgentId,
    /// Position taken
    pub value: VoteValue,
    /// Agent confidence in the range 0.0..=1.0
    pub confidence: f64,
    /// True once the human has vetoed this vote
    pub override_by_user: bool,
    /// Human-supplied justification for the veto
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
    /// When the vote was cast
    pub created_at: DateTime<Utc>,
}

impl Vote {
    /// Record a fresh, non-overridden vote. Confidence is clamped to 0.0..=1.0.
    pub fn new(proposal_id: ProposalId, agent_id: AgentId, value: VoteValue, confidence: f64) -> Self {
        Self {
            id: VoteId::generate(),
            proposal_id,
            agent_id,
            value,
            confidence: confidence.clamp(0.0, 1.0),
            override_by_user: false,
            override_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Apply a human override with its reason
    pub fn mark_overridden(&mut self, reason: Option<String>) {
        self.override_by_user = true;
        self.override_reason = reason;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        let v = Vote::new(
            ProposalId::new("p-1"),
            AgentId::new("a-1"),
            VoteValue::Approve,
            1.7,
        );
        assert_eq!(v.confidence, 1.0);
        assert!(!v.override_by_user);
    }

    #[test]
    fn test_mark_overridden_records_reason() {
        let mut v = Vote::new(
            ProposalId::new("p-1"),
            AgentId::new("a-1"),
            VoteValue::Reject,
            0.4,
        );
        v.mark_overridden(Some("I disagree with the agent".into()));
        assert!(v.override_by_user);
        assert_eq!(v.override_reason.as_deref(), Some("I disagree with the agent"));
    }
}
