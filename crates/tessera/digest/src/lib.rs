//! Tessera digest pipeline.
//!
//! A recurring background consumer that, per user, aggregates recent
//! agent votes, new proposals, and upcoming veto deadlines into a Digest
//! record. Jobs arrive through an at-least-once queue; the worker reads
//! votes, proposals, and agent state but writes only Digest rows, so a
//! redelivered job can never corrupt vote or ledger state.

#![deny(unsafe_code)]

mod job;
mod pool;
mod queue;
mod renderer;
mod scheduler;
mod worker;

pub use job::{DigestJob, JobResult, JobStatus};
pub use pool::{DigestWorkerPool, WorkerPoolConfig};
pub use queue::{InMemoryJobQueue, JobQueue, QueueError};
pub use renderer::{ActivitySummary, DigestRenderer, TemplateRenderer};
pub use scheduler::{DigestScheduler, SchedulerConfig};
pub use worker::{DigestError, DigestWorker, DEFAULT_FREQUENCY_HOURS};
