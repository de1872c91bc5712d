//! Sequential transfer queue with fixed-delay retries.
//!
//! ## Design
//!
//! - One batch per client request, one job per asset
//! - A single processor task drains a shared FIFO at a fixed rate
//! - `batch_concurrency` (default 1) caps in-flight jobs across all batches,
//!   because transfers touching the same Merkle tree invalidate each other's proofs
//! - Failed jobs go back to the tail after `retry_delay`, up to `max_retries`
//! - State lives in memory for the lifetime of the process
//!
//! ## Components
//!
//! - `QueueStore`: pending / in-flight / retrying / completed collections and batch records
//! - `QueueService`: submission, status reads, cancellation and the processor loop
//! - `JobHandler`: what the processor runs for each job (the transfer executor)

pub mod service;
pub mod store;
pub mod types;

pub use service::{JobHandler, QueueConfig, QueueError, QueueService};
pub use store::{FailureDisposition, QueueStore, QueueStoreError};
pub use types::{
    BackoffStrategy, Batch, BatchStats, BatchStatus, BatchSummary, BatchView, CancelView, Job,
    JobStatus, JobView, QueueSnapshot, RetryPolicy,
};
