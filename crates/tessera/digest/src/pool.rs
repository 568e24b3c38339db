//! Concurrent job consumers with capped retry.
//!
//! Each consumer pulls independently; jobs for different users run
//! concurrently, and duplicate in-flight jobs for the same user are
//! tolerated because the worker only appends Digest rows.

use crate::queue::JobQueue;
use crate::worker::DigestWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pool tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent consumers.
    pub workers: usize,
    /// Total attempts per job before it is dropped.
    pub max_attempts: u32,
    /// Base backoff before a failed job is re-enqueued; scales linearly
    /// with the attempt count.
    pub retry_backoff: Duration,
    /// Sleep between polls when the queue is empty.
    pub idle_delay: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(5),
            idle_delay: Duration::from_millis(500),
        }
    }
}

/// Pool of digest consumers over a shared queue.
pub struct DigestWorkerPool {
    worker: Arc<DigestWorker>,
    queue: Arc<dyn JobQueue>,
    config: WorkerPoolConfig,
}

impl DigestWorkerPool {
    pub fn new(worker: Arc<DigestWorker>, queue: Arc<dyn JobQueue>) -> Self {
        Self::with_config(worker, queue, WorkerPoolConfig::default())
    }

    pub fn with_config(
        worker: Arc<DigestWorker>,
        queue: Arc<dyn JobQueue>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            worker,
            queue,
            config,
        }
    }

    /// Spawn the consumers. They drain until `shutdown` flips to true.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.config.workers)
            .map(|consumer| {
                let worker = self.worker.clone();
                let queue = self.queue.clone();
                let config = self.config.clone();
                let mut shutdown = shutdown.clone();

                tokio::spawn(async move {
                    info!(consumer, "Digest consumer started");
                    loop {
                        if *shutdown.borrow() {
                            break;
                        }

                        let job = match queue.dequeue().await {
                            Ok(job) => job,
                            Err(err) => {
                                warn!(consumer, error = %err, "Queue dequeue failed");
                                tokio::time::sleep(config.idle_delay).await;
                                continue;
                            }
                        };

                        let Some(job) = job else {
                            tokio::select! {
                                _ = tokio::time::sleep(config.idle_delay) => {}
                                _ = shutdown.changed() => {}
                            }
                            continue;
                        };

                        match worker.process(&job).await {
                            Ok(result) => {
                                debug!(
                                    consumer,
                                    user_id = %result.user_id,
                                    status = ?result.status,
                                    "Digest job finished"
                                );
                            }
                            Err(err) => {
                                let attempt = job.attempt + 1;
                                if attempt < config.max_attempts {
                                    warn!(
                                        consumer,
                                        user_id = %job.user_id,
                                        attempt,
                                        error = %err,
                                        "Digest job failed; re-enqueueing"
                                    );
                                    tokio::time::sleep(config.retry_backoff * attempt).await;
                                    if let Err(err) = queue.enqueue(job.retried()).await {
                                        error!(consumer, error = %err, "Re-enqueue failed; job lost");
                                    }
                                } else {
                                    error!(
                                        consumer,
                                        user_id = %job.user_id,
                                        attempts = attempt,
                                        error = %err,
                                        "Digest job failed permanently"
                                    );
                                }
                            }
                        }
                    }
                    info!(consumer, "Digest consumer stopped");
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DigestJob;
    use crate::queue::InMemoryJobQueue;
    use crate::renderer::TemplateRenderer;
    use chrono::Utc;
    use tessera_storage::memory::InMemoryStorage;
    use tessera_storage::{AgentStore, DigestStore, ProposalStore, UserStore};
    use tessera_types::{Agent, Proposal, User};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_drains_queue_and_stores_digests() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let storage = Arc::new(InMemoryStorage::new());
        let queue = Arc::new(InMemoryJobQueue::new());

        let user = User::new();
        storage.create_user(user.clone()).await.unwrap();
        storage
            .create_agent(Agent::new(user.id.clone(), "Civvy"))
            .await
            .unwrap();
        storage
            .create_proposal(
                Proposal::new("Crosswalk Signals")
                    .with_created_at(Utc::now() - chrono::Duration::hours(1)),
            )
            .await
            .unwrap();

        queue
            .enqueue(DigestJob::new(user.id.clone()))
            .await
            .unwrap();

        let worker = Arc::new(DigestWorker::new(
            storage.clone(),
            Arc::new(TemplateRenderer::new()),
        ));
        let pool = DigestWorkerPool::with_config(
            worker,
            queue.clone(),
            WorkerPoolConfig {
                workers: 2,
                idle_delay: Duration::from_millis(10),
                ..WorkerPoolConfig::default()
            },
        );

        let (stop, shutdown) = watch::channel(false);
        let handles = pool.spawn(shutdown);

        // Wait for the queue to drain.
        for _ in 0..100 {
            if queue.len().await.unwrap() == 0
                && !storage
                    .digests_for_user(&user.id)
                    .await
                    .unwrap()
                    .is_empty()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        stop.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        let digests = storage.digests_for_user(&user.id).await.unwrap();
        assert_eq!(digests.len(), 1);
    }
}
