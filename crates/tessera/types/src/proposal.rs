//! Proposal types: the decision items agents act on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a Proposal
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

impl ProposalId {
    /// Generate a new random ProposalId
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create a ProposalId from a known string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of decision a proposal asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProposalType {
    /// Spends from the shared treasury when closed
    Monetary,
    /// Policy or other non-financial decision
    #[default]
    Policy,
}

/// Lifecycle status of a proposal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProposalStatus {
    /// Accepting votes and overrides
    #[default]
    Open,
    /// Closed; monetary proposals settle against the treasury
    Closed,
}

impl ProposalStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, ProposalStatus::Open)
    }
}

/// A decision item with an open/closed lifecycle and an optional veto deadline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique proposal identity
    pub id: ProposalId,
    /// Human-readable title
    pub title: String,
    /// Monetary or policy decision
    pub proposal_type: ProposalType,
    /// Simulation-mode proposals never touch the shared treasury
    pub play_mode: bool,
    /// Current lifecycle status
    pub status: ProposalStatus,
    /// Spend amount; required for monetary proposals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Deadline after which an agent's vote becomes final
    #[serde(skip_serializing_if = "Option::is_none")]
    pub veto_window_end: Option<DateTime<Utc>>,
    /// When the proposal was (or is scheduled to be) closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_at: Option<DateTime<Utc>>,
    /// When the proposal was created
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Create a new open policy proposal
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: ProposalId::generate(),
            title: title.into(),
            proposal_type: ProposalType::Policy,
            play_mode: false,
            status: ProposalStatus::Open,
            amount: None,
            veto_window_end: None,
            close_at: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new open monetary proposal
    pub fn monetary(title: impl Into<String>, amount: i64) -> Self {
        let mut proposal = Self::new(title);
        proposal.proposal_type = ProposalType::Monetary;
        proposal.amount = Some(amount);
        proposal
    }

    pub fn with_id(mut self, id: ProposalId) -> Self {
        self.id = id;
        self
    }

    pub fn with_play_mode(mut self, play_mode: bool) -> Self {
        self.play_mode = play_mode;
        self
    }

    pub fn with_veto_window_end(mut self, deadline: DateTime<Utc>) -> Self {
        self.veto_window_end = Some(deadline);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_monetary(&self) -> bool {
        matches!(self.proposal_type, ProposalType::Monetary)
    }

    /// Mark the proposal closed at the given instant
    pub fn close(&mut self, at: DateTime<Utc>) {
        self.status = ProposalStatus::Closed;
        self.close_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monetary_constructor_carries_amount() {
        let p = Proposal::monetary("Bridge repair", 500);
        assert!(p.is_monetary());
        assert_eq!(p.amount, Some(500));
        assert!(p.status.is_open());
    }

    #[test]
    fn test_close_stamps_close_at() {
        let mut p = Proposal::new("Zoning change");
        let at = Utc::now();
        p.close(at);
        assert_eq!(p.status, ProposalStatus::Closed);
        assert_eq!(p.close_at, Some(at));
    }
}
