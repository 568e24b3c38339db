//! Digest job payloads and results.

use serde::{Deserialize, Serialize};
use tessera_types::UserId;

/// Queue message asking for one user's digest to be generated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DigestJob {
    pub user_id: UserId,
    /// Redelivery counter maintained by the worker pool.
    #[serde(default)]
    pub attempt: u32,
}

impl DigestJob {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            attempt: 0,
        }
    }

    /// The same job, one attempt later.
    pub fn retried(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// How a job finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    /// The job ran to completion but had nothing to do (e.g. the user has
    /// no agent yet). Skips are successes, not failures.
    Skipped,
}

/// Completion report for one processed job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JobResult {
    pub fn completed(user_id: UserId) -> Self {
        Self {
            status: JobStatus::Completed,
            user_id,
            reason: None,
        }
    }

    pub fn completed_with_reason(user_id: UserId, reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            user_id,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(user_id: UserId, reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Skipped,
            user_id,
            reason: Some(reason.into()),
        }
    }
}
