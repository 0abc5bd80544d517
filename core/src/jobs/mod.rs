//! The durable job queue and the worker pool that drains it.

pub mod queue;
pub mod store;

pub use queue::{JobHandler, JobQueueService, QueueConfig};
pub use store::JobStore;
