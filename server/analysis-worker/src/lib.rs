//! Log Sentinel analysis worker.
//!
//! Consumes job descriptors from the jobs queue, streams the referenced log
//! file from blob storage through the analyzer, records the outcome in
//! PostgreSQL, deletes the input and publishes a result notification.
//! Collaborators sit behind traits so the engine runs against fakes in tests.

pub mod blob;
pub mod config;
pub mod consumer;
pub mod error;
pub mod executor;
pub mod health;
pub mod job;
pub mod lines;
pub mod logging;
pub mod queue;
pub mod retry;
pub mod store;

pub use config::WorkerConfig;
pub use consumer::{Consumer, ConsumerSettings, ConsumerSummary};
pub use error::WorkerError;
pub use executor::{JobExecutor, JobOutcome};
pub use job::{JobDescriptor, JobState, JobStatus, ResultNotification};
pub use retry::{RetryPolicies, RetryPolicy};
