pub mod context;
pub mod worker;
pub mod worker_primitives;
pub mod worker_registry;

pub use context::{AgentContext, ShutdownSummary, REPORTING_QUEUE_NAME, UPDATE_QUEUE_NAME};
pub use worker::{start_worker, WorkProcessor, WorkerConfig, WorkerHandle, WorkerStats};
pub(crate) use worker_primitives::sleep_with_stop;
pub use worker_primitives::WorkerEvent;
pub use worker_registry::{WorkerHealth, WorkerRegistry, WorkerState};

use crate::config::ConfigError;
use crate::queue::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to create runtime path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("worker `{name}` is already attached to its queue")]
    WorkerAlreadyActive { name: String },
    #[error("failed to spawn worker thread `{name}`: {source}")]
    SpawnWorker {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("worker `{name}` panicked outside item processing")]
    WorkerPanicked { name: String },
    #[error("agent workers are already running")]
    AlreadyStarted,
}
