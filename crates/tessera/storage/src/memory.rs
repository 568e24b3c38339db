//! In-memory reference implementation for the Tessera storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use the transactional Postgres adapter for source-of-truth data.

use crate::model::{DebitOutcome, PendingReview, VoteActivity};
use crate::traits::{
    AgentStore, DigestStore, LedgerStore, ProposalStore, UserStore, VoteStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tessera_types::{
    Agent, AgentId, Digest, LedgerEntry, Proposal, ProposalId, ProposalStatus, SystemConfig, User,
    UserId, Vote, VoteId,
};

/// Treasury state guarded by a single lock so the debit primitive is
/// atomic across the entry list and the config singleton.
#[derive(Default)]
struct LedgerState {
    config: Option<SystemConfig>,
    entries: Vec<LedgerEntry>,
}

/// In-memory Tessera storage adapter.
#[derive(Default)]
pub struct InMemoryStorage {
    proposals: RwLock<HashMap<ProposalId, Proposal>>,
    votes: RwLock<Vec<Vote>>,
    agents: RwLock<HashMap<AgentId, Agent>>,
    users: RwLock<Vec<User>>,
    digests: RwLock<Vec<Digest>>,
    ledger: RwLock<LedgerState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::Backend(format!("{what} lock poisoned"))
}

#[async_trait]
impl ProposalStore for InMemoryStorage {
    async fn create_proposal(&self, proposal: Proposal) -> StorageResult<()> {
        let mut guard = self.proposals.write().map_err(|_| poisoned("proposals"))?;
        if guard.contains_key(&proposal.id) {
            return Err(StorageError::Conflict(format!(
                "proposal {} already exists",
                proposal.id
            )));
        }
        guard.insert(proposal.id.clone(), proposal);
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<Option<Proposal>> {
        let guard = self.proposals.read().map_err(|_| poisoned("proposals"))?;
        Ok(guard.get(proposal_id).cloned())
    }

    async fn close_proposal(
        &self,
        proposal_id: &ProposalId,
        at: DateTime<Utc>,
    ) -> StorageResult<Proposal> {
        let mut guard = self.proposals.write().map_err(|_| poisoned("proposals"))?;
        let proposal = guard
            .get_mut(proposal_id)
            .ok_or_else(|| StorageError::NotFound(format!("proposal {proposal_id} not found")))?;
        proposal.close(at);
        Ok(proposal.clone())
    }

    async fn proposals_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Proposal>> {
        let guard = self.proposals.read().map_err(|_| poisoned("proposals"))?;
        let mut hits: Vec<Proposal> = guard
            .values()
            .filter(|p| p.created_at >= from && p.created_at <= to)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hits)
    }

    async fn pending_review(
        &self,
        agent_id: &AgentId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<PendingReview>> {
        let proposals = self.proposals.read().map_err(|_| poisoned("proposals"))?;
        let votes = self.votes.read().map_err(|_| poisoned("votes"))?;

        let mut hits: Vec<PendingReview> = proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Open)
            .filter(|p| {
                p.veto_window_end
                    .map(|end| end >= from && end <= until)
                    .unwrap_or(false)
            })
            .filter_map(|p| {
                votes
                    .iter()
                    .filter(|v| {
                        v.proposal_id == p.id && &v.agent_id == agent_id && !v.override_by_user
                    })
                    .min_by_key(|v| v.created_at)
                    .map(|v| PendingReview {
                        proposal: p.clone(),
                        vote: v.clone(),
                    })
            })
            .collect();
        hits.sort_by_key(|r| r.proposal.veto_window_end);
        Ok(hits)
    }
}

#[async_trait]
impl VoteStore for InMemoryStorage {
    async fn record_vote(&self, vote: Vote) -> StorageResult<()> {
        let mut guard = self.votes.write().map_err(|_| poisoned("votes"))?;
        if guard.iter().any(|v| v.id == vote.id) {
            return Err(StorageError::Conflict(format!(
                "vote {} already exists",
                vote.id
            )));
        }
        guard.push(vote);
        Ok(())
    }

    async fn get_vote(&self, vote_id: &VoteId) -> StorageResult<Option<Vote>> {
        let guard = self.votes.read().map_err(|_| poisoned("votes"))?;
        Ok(guard.iter().find(|v| &v.id == vote_id).cloned())
    }

    async fn find_agent_vote(
        &self,
        proposal_id: &ProposalId,
        agent_id: &AgentId,
    ) -> StorageResult<Option<Vote>> {
        let guard = self.votes.read().map_err(|_| poisoned("votes"))?;
        Ok(guard
            .iter()
            .find(|v| &v.proposal_id == proposal_id && &v.agent_id == agent_id)
            .cloned())
    }

    async fn set_override(
        &self,
        vote_id: &VoteId,
        reason: Option<String>,
    ) -> StorageResult<Vote> {
        let mut guard = self.votes.write().map_err(|_| poisoned("votes"))?;
        let vote = guard
            .iter_mut()
            .find(|v| &v.id == vote_id)
            .ok_or_else(|| StorageError::NotFound(format!("vote {vote_id} not found")))?;
        vote.mark_overridden(reason);
        Ok(vote.clone())
    }

    async fn votes_for_agent_between(
        &self,
        agent_id: &AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<VoteActivity>> {
        let votes = self.votes.read().map_err(|_| poisoned("votes"))?;
        let proposals = self.proposals.read().map_err(|_| poisoned("proposals"))?;

        let mut hits: Vec<VoteActivity> = votes
            .iter()
            .filter(|v| &v.agent_id == agent_id && v.created_at >= from && v.created_at <= to)
            .filter_map(|v| {
                proposals.get(&v.proposal_id).map(|p| VoteActivity {
                    vote: v.clone(),
                    proposal: p.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.vote.created_at.cmp(&a.vote.created_at));
        Ok(hits)
    }
}

#[async_trait]
impl AgentStore for InMemoryStorage {
    async fn create_agent(&self, agent: Agent) -> StorageResult<()> {
        let mut guard = self.agents.write().map_err(|_| poisoned("agents"))?;
        if guard.contains_key(&agent.id) {
            return Err(StorageError::Conflict(format!(
                "agent {} already exists",
                agent.id
            )));
        }
        if guard.values().any(|a| a.user_id == agent.user_id) {
            return Err(StorageError::Conflict(format!(
                "user {} already owns an agent",
                agent.user_id
            )));
        }
        guard.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<Option<Agent>> {
        let guard = self.agents.read().map_err(|_| poisoned("agents"))?;
        Ok(guard.get(agent_id).cloned())
    }

    async fn agent_for_user(&self, user_id: &UserId) -> StorageResult<Option<Agent>> {
        let guard = self.agents.read().map_err(|_| poisoned("agents"))?;
        Ok(guard.values().find(|a| &a.user_id == user_id).cloned())
    }

    async fn update_agent_preferences(
        &self,
        agent_id: &AgentId,
        preferences: Value,
    ) -> StorageResult<Agent> {
        let mut guard = self.agents.write().map_err(|_| poisoned("agents"))?;
        let agent = guard
            .get_mut(agent_id)
            .ok_or_else(|| StorageError::NotFound(format!("agent {agent_id} not found")))?;
        agent.update_preferences(preferences);
        Ok(agent.clone())
    }
}

#[async_trait]
impl UserStore for InMemoryStorage {
    async fn create_user(&self, user: User) -> StorageResult<()> {
        let mut guard = self.users.write().map_err(|_| poisoned("users"))?;
        if guard.iter().any(|u| u.id == user.id) {
            return Err(StorageError::Conflict(format!(
                "user {} already exists",
                user.id
            )));
        }
        guard.push(user);
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> StorageResult<Option<User>> {
        let guard = self.users.read().map_err(|_| poisoned("users"))?;
        Ok(guard.iter().find(|u| &u.id == user_id).cloned())
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let guard = self.users.read().map_err(|_| poisoned("users"))?;
        Ok(guard.clone())
    }
}

#[async_trait]
impl DigestStore for InMemoryStorage {
    async fn insert_digest(&self, digest: Digest) -> StorageResult<()> {
        let mut guard = self.digests.write().map_err(|_| poisoned("digests"))?;
        guard.push(digest);
        Ok(())
    }

    async fn digests_for_user(&self, user_id: &UserId) -> StorageResult<Vec<Digest>> {
        let guard = self.digests.read().map_err(|_| poisoned("digests"))?;
        let mut hits: Vec<Digest> = guard
            .iter()
            .filter(|d| &d.user_id == user_id)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(hits)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStorage {
    async fn seed_treasury(&self, balance: i64) -> StorageResult<()> {
        let mut guard = self.ledger.write().map_err(|_| poisoned("ledger"))?;
        guard.config = Some(SystemConfig::seeded(balance));
        Ok(())
    }

    async fn treasury_balance(&self) -> StorageResult<i64> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        guard
            .config
            .as_ref()
            .map(|c| c.play_money_treasury)
            .ok_or(StorageError::ConfigMissing)
    }

    async fn post_debit(
        &self,
        proposal_id: &ProposalId,
        amount: i64,
    ) -> StorageResult<DebitOutcome> {
        // One write guard spans the idempotency check, the balance read,
        // the append, and the config update.
        let mut guard = self.ledger.write().map_err(|_| poisoned("ledger"))?;

        if guard.entries.iter().any(|e| &e.proposal_id == proposal_id) {
            return Ok(DebitOutcome::AlreadyPosted);
        }

        let balance = guard
            .config
            .as_ref()
            .map(|c| c.play_money_treasury)
            .ok_or(StorageError::ConfigMissing)?;
        let new_balance = balance - amount;

        let entry = LedgerEntry::new(proposal_id.clone(), -amount, new_balance);
        guard.entries.push(entry.clone());
        if let Some(config) = guard.config.as_mut() {
            config.play_money_treasury = new_balance;
        }
        Ok(DebitOutcome::Applied(entry))
    }

    async fn entry_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> StorageResult<Option<LedgerEntry>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        Ok(guard
            .entries
            .iter()
            .find(|e| &e.proposal_id == proposal_id)
            .cloned())
    }

    async fn ledger_entries(&self) -> StorageResult<Vec<LedgerEntry>> {
        let guard = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        Ok(guard.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tessera_types::VoteValue;

    fn agent_vote(proposal: &Proposal, agent: &AgentId) -> Vote {
        Vote::new(proposal.id.clone(), agent.clone(), VoteValue::Approve, 0.8)
    }

    #[tokio::test]
    async fn test_post_debit_is_idempotent() {
        let store = InMemoryStorage::new();
        store.seed_treasury(100_000).await.unwrap();
        let pid = ProposalId::new("p-1");

        let first = store.post_debit(&pid, 500).await.unwrap();
        assert!(matches!(first, DebitOutcome::Applied(_)));
        assert_eq!(store.treasury_balance().await.unwrap(), 99_500);

        let second = store.post_debit(&pid, 500).await.unwrap();
        assert!(matches!(second, DebitOutcome::AlreadyPosted));
        assert_eq!(store.treasury_balance().await.unwrap(), 99_500);
        assert_eq!(store.ledger_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_debit_without_config_is_fatal() {
        let store = InMemoryStorage::new();
        let result = store.post_debit(&ProposalId::new("p-1"), 500).await;
        assert!(matches!(result, Err(StorageError::ConfigMissing)));
        assert!(store.ledger_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_review_window_bounds() {
        let store = InMemoryStorage::new();
        let agent = AgentId::new("agent-1");
        let now = Utc::now();

        let due_now = Proposal::new("Due now").with_veto_window_end(now);
        let past = Proposal::new("Past").with_veto_window_end(now - Duration::hours(1));
        let far = Proposal::new("Far").with_veto_window_end(now + Duration::hours(48));

        for p in [&due_now, &past, &far] {
            store.create_proposal(p.clone()).await.unwrap();
            store.record_vote(agent_vote(p, &agent)).await.unwrap();
        }

        let hits = store
            .pending_review(&agent, now, now + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].proposal.id, due_now.id);
    }

    #[tokio::test]
    async fn test_pending_review_excludes_overridden_votes() {
        let store = InMemoryStorage::new();
        let agent = AgentId::new("agent-1");
        let now = Utc::now();

        let proposal = Proposal::new("Vetoed").with_veto_window_end(now + Duration::hours(2));
        store.create_proposal(proposal.clone()).await.unwrap();
        let vote = agent_vote(&proposal, &agent);
        let vote_id = vote.id.clone();
        store.record_vote(vote).await.unwrap();
        store.set_override(&vote_id, Some("changed my mind".into())).await.unwrap();

        let hits = store
            .pending_review(&agent, now, now + Duration::hours(24))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_pending_review_tolerates_duplicate_votes() {
        let store = InMemoryStorage::new();
        let agent = AgentId::new("agent-1");
        let now = Utc::now();

        let proposal = Proposal::new("Voted twice").with_veto_window_end(now + Duration::hours(2));
        store.create_proposal(proposal.clone()).await.unwrap();
        let first = agent_vote(&proposal, &agent).with_created_at(now - Duration::hours(2));
        let first_id = first.id.clone();
        store.record_vote(first).await.unwrap();
        store
            .record_vote(agent_vote(&proposal, &agent).with_created_at(now - Duration::hours(1)))
            .await
            .unwrap();

        // One row per proposal, carrying the earliest matching vote.
        let hits = store
            .pending_review(&agent, now, now + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].vote.id, first_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_postings_reconcile() {
        let store = Arc::new(InMemoryStorage::new());
        store.seed_treasury(100_000).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let pid = ProposalId::new(format!("p-{i}"));
                // Every proposal posts twice; only one may land.
                store.post_debit(&pid, 100).await.unwrap();
                store.post_debit(&pid, 100).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.ledger_entries().await.unwrap().len(), 16);
        assert_eq!(store.treasury_balance().await.unwrap(), 100_000 - 1_600);
    }

    #[tokio::test]
    async fn test_one_agent_per_user() {
        let store = InMemoryStorage::new();
        let user = UserId::new("u-1");
        store
            .create_agent(Agent::new(user.clone(), "Civvy"))
            .await
            .unwrap();
        let err = store.create_agent(Agent::new(user, "Other")).await;
        assert!(matches!(err, Err(StorageError::Conflict(_))));
    }
}
