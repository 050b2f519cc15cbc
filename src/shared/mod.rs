pub mod fs_atomic;
pub mod ids;
pub mod logging;
pub mod result;

pub use fs_atomic::atomic_write_file;
pub use ids::WorkflowId;
pub use logging::{LogLevel, LogTarget, RuntimeLog};
pub use result::{codes, erc, UpdateResult};

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
