//! Digest record: a periodic, per-user activity summary.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a Digest
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigestId(pub String);

impl DigestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for DigestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rendered activity summary. Immutable once created; written only by
/// the digest worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Digest {
    /// Unique digest identity
    pub id: DigestId,
    /// The user this digest was generated for
    pub user_id: UserId,
    /// Rendered digest text
    pub content: String,
    /// When the worker produced it
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    pub fn new(user_id: UserId, content: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            id: DigestId::generate(),
            user_id,
            content: content.into(),
            generated_at,
        }
    }
}
