//! Recurring digest scheduling.
//!
//! The scheduler is the production producer of digest jobs: on each tick
//! it enqueues a job for every user whose cadence has elapsed since their
//! last stored digest. Generation itself stays in the worker pool.

use crate::job::DigestJob;
use crate::queue::JobQueue;
use crate::worker::{DigestError, DEFAULT_FREQUENCY_HOURS};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tessera_storage::{DigestStore, TesseraStorage, UserStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to look for due users.
    pub tick: std::time::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: std::time::Duration::from_secs(60),
        }
    }
}

/// Enqueues digest jobs on each user's cadence.
pub struct DigestScheduler {
    storage: Arc<dyn TesseraStorage>,
    queue: Arc<dyn JobQueue>,
    config: SchedulerConfig,
}

impl DigestScheduler {
    pub fn new(storage: Arc<dyn TesseraStorage>, queue: Arc<dyn JobQueue>) -> Self {
        Self::with_config(storage, queue, SchedulerConfig::default())
    }

    pub fn with_config(
        storage: Arc<dyn TesseraStorage>,
        queue: Arc<dyn JobQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            storage,
            queue,
            config,
        }
    }

    /// Enqueue a job for every user whose digest is due at `now`.
    /// Returns how many jobs were enqueued.
    pub async fn enqueue_due(&self, now: DateTime<Utc>) -> Result<usize, DigestError> {
        let users = self.storage.list_users().await?;
        let mut enqueued = 0;

        for user in users {
            let hours = user
                .digest_frequency_hours
                .unwrap_or(DEFAULT_FREQUENCY_HOURS);
            let cadence = Duration::hours(i64::from(hours));

            let due = match self.storage.digests_for_user(&user.id).await?.first() {
                Some(latest) => now - latest.generated_at >= cadence,
                None => true,
            };

            if due {
                self.queue.enqueue(DigestJob::new(user.id.clone())).await?;
                enqueued += 1;
            }
        }

        if enqueued > 0 {
            info!(enqueued, "Digest jobs scheduled");
        }
        Ok(enqueued)
    }

    /// Run ticks until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.config.tick);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(err) = self.enqueue_due(Utc::now()).await {
                            warn!(error = %err, "Digest scheduling pass failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Digest scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use tessera_storage::memory::InMemoryStorage;
    use tessera_types::{Digest, User};

    #[tokio::test]
    async fn test_user_without_digest_is_due_immediately() {
        let storage = Arc::new(InMemoryStorage::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let user = User::new();
        storage.create_user(user.clone()).await.unwrap();

        let scheduler = DigestScheduler::new(storage, queue.clone());
        let enqueued = scheduler.enqueue_due(Utc::now()).await.unwrap();
        assert_eq!(enqueued, 1);
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recent_digest_suppresses_enqueue() {
        let storage = Arc::new(InMemoryStorage::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let now = Utc::now();

        let user = User::new().with_digest_frequency_hours(24);
        storage.create_user(user.clone()).await.unwrap();
        storage
            .insert_digest(Digest::new(
                user.id.clone(),
                "recent digest",
                now - Duration::hours(2),
            ))
            .await
            .unwrap();

        let scheduler = DigestScheduler::new(storage, queue.clone());
        let enqueued = scheduler.enqueue_due(now).await.unwrap();
        assert_eq!(enqueued, 0);
    }

    #[tokio::test]
    async fn test_stale_digest_triggers_enqueue() {
        let storage = Arc::new(InMemoryStorage::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let now = Utc::now();

        let user = User::new().with_digest_frequency_hours(12);
        storage.create_user(user.clone()).await.unwrap();
        storage
            .insert_digest(Digest::new(
                user.id.clone(),
                "old digest",
                now - Duration::hours(13),
            ))
            .await
            .unwrap();

        let scheduler = DigestScheduler::new(storage, queue.clone());
        let enqueued = scheduler.enqueue_due(now).await.unwrap();
        assert_eq!(enqueued, 1);
    }
}
