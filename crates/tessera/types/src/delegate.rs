//! User and delegated-agent types.
//!
//! Every Agent is owned by exactly one User. The User keeps the veto
//! right and the digest cadence; the Agent carries the preference
//! document that steers how it votes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a User
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an Agent
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Voice used when rendering a user's digest
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DigestTone {
    Friendly,
    Formal,
    #[default]
    Neutral,
}

/// A human principal who delegates civic decisions to one agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    /// Unique user identity
    pub id: UserId,
    /// Hours between digests; `None` falls back to the 24h default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_frequency_hours: Option<u32>,
    /// Voice for rendered digests
    pub digest_tone: DigestTone,
    /// When the user registered
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new() -> Self {
        Self {
            id: UserId::generate(),
            digest_frequency_hours: None,
            digest_tone: DigestTone::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = id;
        self
    }

    pub fn with_digest_frequency_hours(mut self, hours: u32) -> Self {
        self.digest_frequency_hours = Some(hours);
        self
    }

    pub fn with_digest_tone(mut self, tone: DigestTone) -> Self {
        self.digest_tone = tone;
        self
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

/// The software delegate that votes on a user's behalf.
///
/// Created during onboarding, mutated by preference updates, never
/// hard-deleted while its User exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identity
    pub id: AgentId,
    /// Owning user (1:1)
    pub user_id: UserId,
    /// Display nickname chosen by the user
    pub nickname: String,
    /// Free-form preference document: issue matrix, notification cadence
    pub preferences: Value,
    /// When the agent was created
    pub created_at: DateTime<Utc>,
    /// Last preference update
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(user_id: UserId, nickname: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::generate(),
            user_id,
            nickname: nickname.into(),
            preferences: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_preferences(mut self, preferences: Value) -> Self {
        self.preferences = preferences;
        self
    }

    /// Replace the preference document and bump `updated_at`
    pub fn update_preferences(&mut self, preferences: Value) {
        self.preferences = preferences;
        self.updated_at = Utc::now();
    }
}
