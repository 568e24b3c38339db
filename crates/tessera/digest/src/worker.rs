//! The digest worker: one job in, zero or one Digest rows out.

use crate::job::{DigestJob, JobResult};
use crate::renderer::{ActivitySummary, DigestRenderer};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tessera_storage::{
    AgentStore, DigestStore, ProposalStore, StorageError, TesseraStorage, UserStore, VoteStore,
};
use tessera_types::Digest;
use thiserror::Error;
use tracing::{debug, info};

/// Window applied when the user has not chosen a digest cadence.
pub const DEFAULT_FREQUENCY_HOURS: u32 = 24;

/// Digest worker errors. Anything here propagates to the caller so the
/// queue's retry-with-backoff policy applies; the worker swallows nothing
/// beyond the expected missing-user/missing-agent skips.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] crate::queue::QueueError),
}

/// Generates one user's digest per job, idempotently tolerant of
/// redelivery: reprocessing re-derives the same content, and Digest rows
/// are append-only, so a duplicate can never corrupt state.
pub struct DigestWorker {
    storage: Arc<dyn TesseraStorage>,
    renderer: Arc<dyn DigestRenderer>,
}

impl DigestWorker {
    pub fn new(storage: Arc<dyn TesseraStorage>, renderer: Arc<dyn DigestRenderer>) -> Self {
        Self { storage, renderer }
    }

    /// Process one job against the current wall clock.
    pub async fn process(&self, job: &DigestJob) -> Result<JobResult, DigestError> {
        self.process_at(job, Utc::now()).await
    }

    /// Process one job against an explicit `now` (deterministic in tests).
    pub async fn process_at(
        &self,
        job: &DigestJob,
        now: DateTime<Utc>,
    ) -> Result<JobResult, DigestError> {
        let user = match self.storage.get_user(&job.user_id).await? {
            Some(user) => user,
            None => {
                debug!(user_id = %job.user_id, "Digest skipped: user not found");
                return Ok(JobResult::skipped(job.user_id.clone(), "user not found"));
            }
        };

        // A missing agent is an expected steady state (pre-onboarding
        // users), not a failure.
        let agent = match self.storage.agent_for_user(&user.id).await? {
            Some(agent) => agent,
            None => {
                debug!(user_id = %user.id, "Digest skipped: no agent provisioned");
                return Ok(JobResult::skipped(user.id, "agent not provisioned"));
            }
        };

        let hours = user
            .digest_frequency_hours
            .unwrap_or(DEFAULT_FREQUENCY_HOURS);
        let window = Duration::hours(i64::from(hours));
        let window_start = now - window;

        let activity = ActivitySummary {
            veto_alerts: self
                .storage
                .pending_review(&agent.id, now, now + window)
                .await?,
            votes: self
                .storage
                .votes_for_agent_between(&agent.id, window_start, now)
                .await?,
            new_proposals: self
                .storage
                .proposals_created_between(window_start, now)
                .await?,
        };

        let content = self.renderer.render(user.digest_tone, &activity);

        // Empty-activity digests are rendered but intentionally not
        // stored, to keep digest history free of no-op records.
        if activity.is_empty() {
            debug!(user_id = %user.id, "No activity in window; digest not stored");
            return Ok(JobResult::completed_with_reason(user.id, "no activity"));
        }

        self.storage
            .insert_digest(Digest::new(user.id.clone(), content, now))
            .await?;

        info!(
            user_id = %user.id,
            veto_alerts = activity.veto_alerts.len(),
            votes = activity.votes.len(),
            new_proposals = activity.new_proposals.len(),
            "Digest generated"
        );

        Ok(JobResult::completed(user.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::renderer::TemplateRenderer;
    use tessera_storage::memory::InMemoryStorage;
    use tessera_types::{Agent, DigestTone, Proposal, User, UserId, Vote, VoteValue};

    struct Rig {
        worker: DigestWorker,
        storage: Arc<InMemoryStorage>,
        user: User,
        agent: Agent,
    }

    async fn setup() -> Rig {
        let storage = Arc::new(InMemoryStorage::new());

        let user = User::new()
            .with_digest_frequency_hours(24)
            .with_digest_tone(DigestTone::Neutral);
        storage.create_user(user.clone()).await.unwrap();

        let agent = Agent::new(user.id.clone(), "Civvy");
        storage.create_agent(agent.clone()).await.unwrap();

        Rig {
            worker: DigestWorker::new(storage.clone(), Arc::new(TemplateRenderer::new())),
            storage,
            user,
            agent,
        }
    }

    #[tokio::test]
    async fn test_missing_user_skips_without_writing() {
        let rig = setup().await;
        let missing = UserId::new("ghost");
        let result = rig
            .worker
            .process(&DigestJob::new(missing.clone()))
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Skipped);
        assert!(rig
            .storage
            .digests_for_user(&missing)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_agent_skips_without_writing() {
        let rig = setup().await;
        let lonely = User::new();
        rig.storage.create_user(lonely.clone()).await.unwrap();

        let result = rig
            .worker
            .process(&DigestJob::new(lonely.id.clone()))
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Skipped);
        assert_eq!(result.reason.as_deref(), Some("agent not provisioned"));
        assert!(rig
            .storage
            .digests_for_user(&lonely.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_no_activity_completes_but_stores_nothing() {
        let rig = setup().await;
        let result = rig
            .worker
            .process(&DigestJob::new(rig.user.id.clone()))
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.reason.as_deref(), Some("no activity"));
        assert!(rig
            .storage
            .digests_for_user(&rig.user.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_single_vote_digest_has_exactly_one_section() {
        let rig = setup().await;
        let now = Utc::now();

        // One vote cast 2 hours ago, no new proposals in window, no
        // upcoming veto deadlines.
        let proposal = Proposal::new("Water-Treatment Plant Funding Gap")
            .with_created_at(now - Duration::days(10));
        rig.storage.create_proposal(proposal.clone()).await.unwrap();
        rig.storage
            .record_vote(
                Vote::new(
                    proposal.id.clone(),
                    rig.agent.id.clone(),
                    VoteValue::Approve,
                    0.9,
                )
                .with_created_at(now - Duration::hours(2)),
            )
            .await
            .unwrap();

        let result = rig
            .worker
            .process_at(&DigestJob::new(rig.user.id.clone()), now)
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Completed);

        let digests = rig.storage.digests_for_user(&rig.user.id).await.unwrap();
        assert_eq!(digests.len(), 1);
        let content = &digests[0].content;
        assert!(content.contains("## Recent Agent Votes"));
        assert!(content.contains("Water-Treatment Plant Funding Gap"));
        assert!(!content.contains("## Veto Window Alerts"));
        assert!(!content.contains("## New Proposals"));
    }

    #[tokio::test]
    async fn test_window_respects_user_frequency() {
        let rig = setup().await;
        let now = Utc::now();

        // Vote is 30 hours old: outside the 24h window.
        let proposal = Proposal::new("Old news").with_created_at(now - Duration::days(10));
        rig.storage.create_proposal(proposal.clone()).await.unwrap();
        rig.storage
            .record_vote(
                Vote::new(
                    proposal.id.clone(),
                    rig.agent.id.clone(),
                    VoteValue::Reject,
                    0.5,
                )
                .with_created_at(now - Duration::hours(30)),
            )
            .await
            .unwrap();

        let result = rig
            .worker
            .process_at(&DigestJob::new(rig.user.id.clone()), now)
            .await
            .unwrap();
        assert_eq!(result.reason.as_deref(), Some("no activity"));
    }

    #[tokio::test]
    async fn test_upcoming_deadline_produces_alert_section() {
        let rig = setup().await;
        let now = Utc::now();

        let proposal = Proposal::new("Transit Fare Increase")
            .with_veto_window_end(now + Duration::hours(6))
            .with_created_at(now - Duration::days(3));
        rig.storage.create_proposal(proposal.clone()).await.unwrap();
        rig.storage
            .record_vote(
                Vote::new(
                    proposal.id.clone(),
                    rig.agent.id.clone(),
                    VoteValue::Approve,
                    0.7,
                )
                .with_created_at(now - Duration::days(2)),
            )
            .await
            .unwrap();

        rig.worker
            .process_at(&DigestJob::new(rig.user.id.clone()), now)
            .await
            .unwrap();

        let digests = rig.storage.digests_for_user(&rig.user.id).await.unwrap();
        assert_eq!(digests.len(), 1);
        assert!(digests[0].content.contains("## Veto Window Alerts"));
        assert!(digests[0].content.contains("Transit Fare Increase"));
    }

    #[tokio::test]
    async fn test_redelivery_appends_rather_than_corrupts() {
        let rig = setup().await;
        let now = Utc::now();

        let proposal = Proposal::new("Park Renovation").with_created_at(now - Duration::hours(1));
        rig.storage.create_proposal(proposal).await.unwrap();

        let job = DigestJob::new(rig.user.id.clone());
        rig.worker.process_at(&job, now).await.unwrap();
        rig.worker.process_at(&job.retried(), now).await.unwrap();

        // Duplicate digests are an accepted redundancy, not corruption.
        let digests = rig.storage.digests_for_user(&rig.user.id).await.unwrap();
        assert_eq!(digests.len(), 2);
        assert_eq!(digests[0].content, digests[1].content);
    }
}
