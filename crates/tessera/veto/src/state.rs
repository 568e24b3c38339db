//! Derived vote state classification.

use chrono::{DateTime, Utc};

/// Where a vote stands in the veto window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteState {
    /// Recorded, not overridden, deadline not yet passed. The human may
    /// still veto.
    Cast,
    /// Deadline passed without an override; the vote stands. No write
    /// marks this transition, it happens by wall-clock passage alone.
    Final,
    /// The human explicitly overrode the vote.
    Overridden,
}

impl VoteState {
    /// Classify a vote from the authoritative fields.
    ///
    /// The deadline instant itself still belongs to the window: a vote
    /// whose deadline equals `now` is `Cast`, matching the inclusive
    /// lower bound of the pending-review query. A vote with no deadline
    /// stays `Cast` until its proposal closes.
    pub fn classify(
        now: DateTime<Utc>,
        veto_window_end: Option<DateTime<Utc>>,
        override_by_user: bool,
    ) -> Self {
        if override_by_user {
            return VoteState::Overridden;
        }
        match veto_window_end {
            Some(end) if now > end => VoteState::Final,
            _ => VoteState::Cast,
        }
    }
}
