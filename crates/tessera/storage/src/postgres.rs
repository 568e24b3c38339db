//! PostgreSQL adapter for Tessera storage.
//!
//! This adapter is the transactional source-of-truth backend. The treasury
//! debit runs inside a single transaction that row-locks the SystemConfig
//! singleton, so concurrent proposal closures serialize at the storage
//! layer rather than in application logic.

use crate::model::{DebitOutcome, PendingReview, VoteActivity};
use crate::traits::{
    AgentStore, DigestStore, LedgerStore, ProposalStore, UserStore, VoteStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Acquire, Row};
use tessera_types::{
    Agent, AgentId, Digest, DigestId, DigestTone, LedgerEntry, LedgerEntryId, Proposal,
    ProposalId, ProposalStatus, ProposalType, User, UserId, Vote, VoteId, VoteValue,
    SYSTEM_CONFIG_ID,
};

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS tessera_proposals (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                proposal_type TEXT NOT NULL,
                play_mode BOOLEAN NOT NULL,
                status TEXT NOT NULL,
                amount BIGINT,
                veto_window_end TIMESTAMPTZ,
                close_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tessera_votes (
                id TEXT PRIMARY KEY,
                proposal_id TEXT NOT NULL REFERENCES tessera_proposals(id),
                agent_id TEXT NOT NULL,
                value TEXT NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                override_by_user BOOLEAN NOT NULL,
                override_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tessera_users (
                id TEXT PRIMARY KEY,
                digest_frequency_hours INTEGER,
                digest_tone TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tessera_agents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE REFERENCES tessera_users(id),
                nickname TEXT NOT NULL,
                preferences JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tessera_digests (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                generated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tessera_ledger_entries (
                id TEXT PRIMARY KEY,
                proposal_id TEXT NOT NULL UNIQUE,
                amount BIGINT NOT NULL,
                balance_after BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tessera_system_config (
                id BIGINT PRIMARY KEY,
                play_money_treasury BIGINT NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProposalStore for PostgresStorage {
    async fn create_proposal(&self, proposal: Proposal) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tessera_proposals
                (id, title, proposal_type, play_mode, status, amount, veto_window_end, close_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(proposal.id.0.clone())
        .bind(proposal.title.clone())
        .bind(proposal_type_to_str(proposal.proposal_type))
        .bind(proposal.play_mode)
        .bind(status_to_str(proposal.status))
        .bind(proposal.amount)
        .bind(proposal.veto_window_end)
        .bind(proposal.close_at)
        .bind(proposal.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &ProposalId) -> StorageResult<Option<Proposal>> {
        let row = sqlx::query("SELECT * FROM tessera_proposals WHERE id = $1")
            .bind(proposal_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_proposal).transpose()
    }

    async fn close_proposal(
        &self,
        proposal_id: &ProposalId,
        at: DateTime<Utc>,
    ) -> StorageResult<Proposal> {
        let row = sqlx::query(
            r#"
            UPDATE tessera_proposals
               SET status = $1, close_at = $2
             WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status_to_str(ProposalStatus::Closed))
        .bind(at)
        .bind(proposal_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_proposal).transpose()?.ok_or_else(|| {
            StorageError::NotFound(format!("proposal {proposal_id} not found"))
        })
    }

    async fn proposals_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Proposal>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tessera_proposals
             WHERE created_at >= $1 AND created_at <= $2
             ORDER BY created_at DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(row_to_proposal).collect()
    }

    async fn pending_review(
        &self,
        agent_id: &AgentId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<PendingReview>> {
        // Both window bounds inclusive: a deadline of exactly `from` still
        // qualifies for review.
        let rows = sqlx::query(
            r#"
            SELECT p.id AS p_id, p.title, p.proposal_type, p.play_mode, p.status,
                   p.amount, p.veto_window_end, p.close_at, p.created_at AS p_created_at,
                   v.id AS v_id, v.proposal_id, v.agent_id, v.value, v.confidence,
                   v.override_by_user, v.override_reason, v.created_at AS v_created_at
              FROM tessera_proposals p
              JOIN tessera_votes v ON v.proposal_id = p.id
             WHERE p.status = 'open'
               AND v.agent_id = $1
               AND v.override_by_user = FALSE
               AND p.veto_window_end IS NOT NULL
               AND p.veto_window_end >= $2
               AND p.veto_window_end <= $3
             ORDER BY p.veto_window_end ASC, v.created_at ASC
            "#,
        )
        .bind(agent_id.0.clone())
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        // An agent may hold several votes on one proposal; keep the first
        // (earliest) match per proposal.
        let mut hits: Vec<PendingReview> = Vec::new();
        for row in rows {
            let review = joined_row_to_pending_review(row)?;
            if hits.iter().any(|r| r.proposal.id == review.proposal.id) {
                continue;
            }
            hits.push(review);
        }
        Ok(hits)
    }
}

#[async_trait]
impl VoteStore for PostgresStorage {
    async fn record_vote(&self, vote: Vote) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tessera_votes
                (id, proposal_id, agent_id, value, confidence, override_by_user, override_reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(vote.id.0.clone())
        .bind(vote.proposal_id.0.clone())
        .bind(vote.agent_id.0.clone())
        .bind(vote_value_to_str(vote.value))
        .bind(vote.confidence)
        .bind(vote.override_by_user)
        .bind(vote.override_reason.clone())
        .bind(vote.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_vote(&self, vote_id: &VoteId) -> StorageResult<Option<Vote>> {
        let row = sqlx::query("SELECT * FROM tessera_votes WHERE id = $1")
            .bind(vote_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_vote).transpose()
    }

    async fn find_agent_vote(
        &self,
        proposal_id: &ProposalId,
        agent_id: &AgentId,
    ) -> StorageResult<Option<Vote>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM tessera_votes
             WHERE proposal_id = $1 AND agent_id = $2
             ORDER BY created_at ASC
             LIMIT 1
            "#,
        )
        .bind(proposal_id.0.clone())
        .bind(agent_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_vote).transpose()
    }

    async fn set_override(
        &self,
        vote_id: &VoteId,
        reason: Option<String>,
    ) -> StorageResult<Vote> {
        let row = sqlx::query(
            r#"
            UPDATE tessera_votes
               SET override_by_user = TRUE, override_reason = $1
             WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(reason)
        .bind(vote_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_vote)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound(format!("vote {vote_id} not found")))
    }

    async fn votes_for_agent_between(
        &self,
        agent_id: &AgentId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<VoteActivity>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id AS p_id, p.title, p.proposal_type, p.play_mode, p.status,
                   p.amount, p.veto_window_end, p.close_at, p.created_at AS p_created_at,
                   v.id AS v_id, v.proposal_id, v.agent_id, v.value, v.confidence,
                   v.override_by_user, v.override_reason, v.created_at AS v_created_at
              FROM tessera_votes v
              JOIN tessera_proposals p ON p.id = v.proposal_id
             WHERE v.agent_id = $1
               AND v.created_at >= $2
               AND v.created_at <= $3
             ORDER BY v.created_at DESC
            "#,
        )
        .bind(agent_id.0.clone())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let review = joined_row_to_pending_review(row)?;
                Ok(VoteActivity {
                    vote: review.vote,
                    proposal: review.proposal,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AgentStore for PostgresStorage {
    async fn create_agent(&self, agent: Agent) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tessera_agents
                (id, user_id, nickname, preferences, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(agent.id.0.clone())
        .bind(agent.user_id.0.clone())
        .bind(agent.nickname.clone())
        .bind(agent.preferences.clone())
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_agent(&self, agent_id: &AgentId) -> StorageResult<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM tessera_agents WHERE id = $1")
            .bind(agent_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_agent).transpose()
    }

    async fn agent_for_user(&self, user_id: &UserId) -> StorageResult<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM tessera_agents WHERE user_id = $1")
            .bind(user_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_agent).transpose()
    }

    async fn update_agent_preferences(
        &self,
        agent_id: &AgentId,
        preferences: Value,
    ) -> StorageResult<Agent> {
        let row = sqlx::query(
            r#"
            UPDATE tessera_agents
               SET preferences = $1, updated_at = $2
             WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(preferences)
        .bind(Utc::now())
        .bind(agent_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_agent)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound(format!("agent {agent_id} not found")))
    }
}

#[async_trait]
impl UserStore for PostgresStorage {
    async fn create_user(&self, user: User) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tessera_users (id, digest_frequency_hours, digest_tone, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id.0.clone())
        .bind(user.digest_frequency_hours.map(|h| h as i32))
        .bind(tone_to_str(user.digest_tone))
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM tessera_users WHERE id = $1")
            .bind(user_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_user).transpose()
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM tessera_users ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(row_to_user).collect()
    }
}

#[async_trait]
impl DigestStore for PostgresStorage {
    async fn insert_digest(&self, digest: Digest) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tessera_digests (id, user_id, content, generated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(digest.id.0.clone())
        .bind(digest.user_id.0.clone())
        .bind(digest.content.clone())
        .bind(digest.generated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn digests_for_user(&self, user_id: &UserId) -> StorageResult<Vec<Digest>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tessera_digests
             WHERE user_id = $1
             ORDER BY generated_at DESC
            "#,
        )
        .bind(user_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(row_to_digest).collect()
    }
}

#[async_trait]
impl LedgerStore for PostgresStorage {
    async fn seed_treasury(&self, balance: i64) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tessera_system_config (id, play_money_treasury)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET play_money_treasury = EXCLUDED.play_money_treasury
            "#,
        )
        .bind(SYSTEM_CONFIG_ID)
        .bind(balance)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn treasury_balance(&self) -> StorageResult<i64> {
        let row = sqlx::query("SELECT play_money_treasury FROM tessera_system_config WHERE id = $1")
            .bind(SYSTEM_CONFIG_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = row.ok_or(StorageError::ConfigMissing)?;
        row.try_get("play_money_treasury")
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn post_debit(
        &self,
        proposal_id: &ProposalId,
        amount: i64,
    ) -> StorageResult<DebitOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let conn = tx
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // Row-lock the singleton first: concurrent postings serialize here,
        // before the idempotency check, so neither can act on a stale read.
        let config_row = sqlx::query(
            "SELECT play_money_treasury FROM tessera_system_config WHERE id = $1 FOR UPDATE",
        )
        .bind(SYSTEM_CONFIG_ID)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let balance: i64 = config_row
            .ok_or(StorageError::ConfigMissing)?
            .try_get("play_money_treasury")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let existing = sqlx::query("SELECT id FROM tessera_ledger_entries WHERE proposal_id = $1")
            .bind(proposal_id.0.clone())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if existing.is_some() {
            return Ok(DebitOutcome::AlreadyPosted);
        }

        let new_balance = balance - amount;
        let entry = LedgerEntry::new(proposal_id.clone(), -amount, new_balance);

        sqlx::query(
            r#"
            INSERT INTO tessera_ledger_entries (id, proposal_id, amount, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id.0.clone())
        .bind(entry.proposal_id.0.clone())
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_conflict)?;

        sqlx::query("UPDATE tessera_system_config SET play_money_treasury = $1 WHERE id = $2")
            .bind(new_balance)
            .bind(SYSTEM_CONFIG_ID)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(DebitOutcome::Applied(entry))
    }

    async fn entry_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> StorageResult<Option<LedgerEntry>> {
        let row = sqlx::query("SELECT * FROM tessera_ledger_entries WHERE proposal_id = $1")
            .bind(proposal_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(row_to_ledger_entry).transpose()
    }

    async fn ledger_entries(&self) -> StorageResult<Vec<LedgerEntry>> {
        let rows = sqlx::query("SELECT * FROM tessera_ledger_entries ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(row_to_ledger_entry).collect()
    }
}

fn row_to_proposal(row: PgRow) -> StorageResult<Proposal> {
    let proposal_type: String = row
        .try_get("proposal_type")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Proposal {
        id: ProposalId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        title: row
            .try_get("title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        proposal_type: parse_proposal_type(&proposal_type)?,
        play_mode: row
            .try_get("play_mode")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        status: parse_status(&status)?,
        amount: row
            .try_get("amount")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        veto_window_end: row
            .try_get("veto_window_end")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        close_at: row
            .try_get("close_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_vote(row: PgRow) -> StorageResult<Vote> {
    let value: String = row
        .try_get("value")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Vote {
        id: VoteId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        proposal_id: ProposalId::new(
            row.try_get::<String, _>("proposal_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        value: parse_vote_value(&value)?,
        confidence: row
            .try_get("confidence")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        override_by_user: row
            .try_get("override_by_user")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        override_reason: row
            .try_get("override_reason")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

/// Decode one row of the proposal/vote join used by `pending_review` and
/// `votes_for_agent_between` (aliased columns disambiguate the overlap).
fn joined_row_to_pending_review(row: PgRow) -> StorageResult<PendingReview> {
    let proposal_type: String = row
        .try_get("proposal_type")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let value: String = row
        .try_get("value")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    let proposal = Proposal {
        id: ProposalId::new(
            row.try_get::<String, _>("p_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        title: row
            .try_get("title")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        proposal_type: parse_proposal_type(&proposal_type)?,
        play_mode: row
            .try_get("play_mode")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        status: parse_status(&status)?,
        amount: row
            .try_get("amount")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        veto_window_end: row
            .try_get("veto_window_end")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        close_at: row
            .try_get("close_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("p_created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    };

    let vote = Vote {
        id: VoteId::new(
            row.try_get::<String, _>("v_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        proposal_id: proposal.id.clone(),
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        value: parse_vote_value(&value)?,
        confidence: row
            .try_get("confidence")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        override_by_user: row
            .try_get("override_by_user")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        override_reason: row
            .try_get("override_reason")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("v_created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    };

    Ok(PendingReview { proposal, vote })
}

fn row_to_agent(row: PgRow) -> StorageResult<Agent> {
    Ok(Agent {
        id: AgentId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        user_id: UserId::new(
            row.try_get::<String, _>("user_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        nickname: row
            .try_get("nickname")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        preferences: row
            .try_get("preferences")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_user(row: PgRow) -> StorageResult<User> {
    let tone: String = row
        .try_get("digest_tone")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let frequency: Option<i32> = row
        .try_get("digest_frequency_hours")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(User {
        id: UserId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        digest_frequency_hours: frequency.map(|h| h as u32),
        digest_tone: parse_tone(&tone)?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_digest(row: PgRow) -> StorageResult<Digest> {
    Ok(Digest {
        id: DigestId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        user_id: UserId::new(
            row.try_get::<String, _>("user_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        content: row
            .try_get("content")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        generated_at: row
            .try_get("generated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn row_to_ledger_entry(row: PgRow) -> StorageResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: LedgerEntryId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        proposal_id: ProposalId::new(
            row.try_get::<String, _>("proposal_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        amount: row
            .try_get("amount")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        balance_after: row
            .try_get("balance_after")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn proposal_type_to_str(proposal_type: ProposalType) -> &'static str {
    match proposal_type {
        ProposalType::Monetary => "monetary",
        ProposalType::Policy => "policy",
    }
}

fn parse_proposal_type(raw: &str) -> StorageResult<ProposalType> {
    match raw {
        "monetary" => Ok(ProposalType::Monetary),
        "policy" => Ok(ProposalType::Policy),
        _ => Err(StorageError::Serialization(format!(
            "unknown proposal type `{raw}`"
        ))),
    }
}

fn status_to_str(status: ProposalStatus) -> &'static str {
    match status {
        ProposalStatus::Open => "open",
        ProposalStatus::Closed => "closed",
    }
}

fn parse_status(raw: &str) -> StorageResult<ProposalStatus> {
    match raw {
        "open" => Ok(ProposalStatus::Open),
        "closed" => Ok(ProposalStatus::Closed),
        _ => Err(StorageError::Serialization(format!(
            "unknown proposal status `{raw}`"
        ))),
    }
}

fn vote_value_to_str(value: VoteValue) -> &'static str {
    match value {
        VoteValue::Approve => "approve",
        VoteValue::Reject => "reject",
        VoteValue::Abstain => "abstain",
    }
}

fn parse_vote_value(raw: &str) -> StorageResult<VoteValue> {
    match raw {
        "approve" => Ok(VoteValue::Approve),
        "reject" => Ok(VoteValue::Reject),
        "abstain" => Ok(VoteValue::Abstain),
        _ => Err(StorageError::Serialization(format!(
            "unknown vote value `{raw}`"
        ))),
    }
}

fn tone_to_str(tone: DigestTone) -> &'static str {
    match tone {
        DigestTone::Friendly => "friendly",
        DigestTone::Formal => "formal",
        DigestTone::Neutral => "neutral",
    }
}

fn parse_tone(raw: &str) -> StorageResult<DigestTone> {
    match raw {
        "friendly" => Ok(DigestTone::Friendly),
        "formal" => Ok(DigestTone::Formal),
        "neutral" => Ok(DigestTone::Neutral),
        _ => Err(StorageError::Serialization(format!(
            "unknown digest tone `{raw}`"
        ))),
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}
