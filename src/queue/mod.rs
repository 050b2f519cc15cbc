pub mod item;
pub mod registry;
pub mod work_queue;

pub use item::{ItemOrigin, WorkItem};
pub use registry::{DestroyedQueue, QueueSender, WorkQueueHandle, WorkQueueRegistry};
pub use work_queue::WorkQueue;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("work queue handle is null, destroyed or stale")]
    InvalidHandle,
    #[error("work queue `{name}` still has an active worker")]
    WorkerActive { name: String },
    #[error("work queue `{name}` already has a worker attached")]
    WorkerAlreadyAttached { name: String },
    #[error("failed to allocate space for work queue `{name}`")]
    AllocationFailed { name: String },
    #[error("work queue lock poisoned: {0}")]
    LockPoisoned(String),
}
