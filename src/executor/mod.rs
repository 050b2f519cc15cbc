pub mod invocation;
pub mod runner;
pub mod target_data;

pub use invocation::{AllowedUpdateType, ExecutorAction, ExecutorInvocation};
pub use runner::{ExecutorOutput, ExecutorRunner};
pub use target_data::{sha256_hex, write_target_data, TargetDataFile};

use crate::shared::{erc, UpdateResult};

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("update type `{update_type}` is not allowed by the executor")]
    UpdateTypeNotAllowed { update_type: String },
    #[error("update action `{update_action}` is not allowed by the executor")]
    UpdateActionNotAllowed { update_action: String },
    #[error("invalid value for {flag}: {reason}")]
    InvalidArgument { flag: String, reason: String },
    #[error("failed to write target data {path}: {source}")]
    TargetData {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode target data {path}: {source}")]
    EncodeTargetData {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to spawn executor {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for executor {binary}: {source}")]
    Wait {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("executor exited with status {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },
    #[error("executor terminated by signal {signal}")]
    Signaled { signal: i32 },
}

impl ExecutorError {
    pub fn extended_result_code(&self) -> i32 {
        match self {
            Self::UpdateTypeNotAllowed { .. } => erc::EXECUTOR_REJECTED_UPDATE_TYPE,
            Self::UpdateActionNotAllowed { .. } => erc::EXECUTOR_REJECTED_UPDATE_ACTION,
            Self::InvalidArgument { .. } => erc::EXECUTOR_REJECTED_ARGUMENT,
            Self::TargetData { .. } | Self::EncodeTargetData { .. } => {
                erc::EXECUTOR_TARGET_DATA_FAILURE
            }
            Self::Spawn { .. } => erc::EXECUTOR_SPAWN_FAILURE,
            Self::Wait { .. } => erc::EXECUTOR_WAIT_FAILURE,
            Self::NonZeroExit { exit_code, .. } => erc::executor_exit(*exit_code),
            Self::Signaled { signal } => erc::executor_signal(*signal),
        }
    }

    /// True for errors raised before any process was created.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UpdateTypeNotAllowed { .. }
                | Self::UpdateActionNotAllowed { .. }
                | Self::InvalidArgument { .. }
        )
    }

    pub fn to_update_result(&self) -> UpdateResult {
        UpdateResult::failure(self.extended_result_code())
    }
}
