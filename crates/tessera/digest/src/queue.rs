//! Job queue boundary.
//!
//! The broker is an external collaborator; the pipeline only requires
//! durable at-least-once delivery. The in-memory implementation exists
//! for tests and single-process deployments.

use crate::job::DigestJob;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

/// Queue transport errors. These are transient: callers propagate them so
/// the enclosing retry policy applies.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// At-least-once delivery of digest jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: DigestJob) -> Result<(), QueueError>;

    /// Next job, if one is waiting. Consumers poll; a dequeued job that
    /// fails processing is re-enqueued by the worker pool.
    async fn dequeue(&self) -> Result<Option<DigestJob>, QueueError>;

    async fn len(&self) -> Result<usize, QueueError>;
}

/// FIFO in-memory queue.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<VecDeque<DigestJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: DigestJob) -> Result<(), QueueError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| QueueError::Backend("queue lock poisoned".to_string()))?;
        jobs.push_back(job);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<DigestJob>, QueueError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| QueueError::Backend("queue lock poisoned".to_string()))?;
        Ok(jobs.pop_front())
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| QueueError::Backend("queue lock poisoned".to_string()))?;
        Ok(jobs.len())
    }
}
