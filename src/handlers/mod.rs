pub mod dispatch;
pub mod multi_step;
pub mod registry;
pub mod shell_task;
pub mod simulator;
pub mod workflow_data;

pub use dispatch::HandlerDispatcher;
pub use multi_step::MultiStepHandler;
pub use registry::{BuiltinExtension, HandlerEnv, HandlerExtension, HandlerRegistry};
pub use shell_task::ShellTaskHandler;
pub use simulator::SimulatorHandler;
pub use workflow_data::{StepOutcome, StepOutcomes, WorkflowData};

use crate::shared::{codes, erc, UpdateResult};
use serde::{Deserialize, Serialize};

pub const SUPPORTED_CONTRACT_MAJOR: u32 = 1;

/// The capability set every content handler implements.
///
/// Methods never return errors: every outcome, including failure, is an
/// [`UpdateResult`].
pub trait ContentHandler: Send + Sync {
    fn download(&self, data: &WorkflowData) -> UpdateResult;
    fn install(&self, data: &WorkflowData) -> UpdateResult;
    fn apply(&self, data: &WorkflowData) -> UpdateResult;
    fn cancel(&self, data: &WorkflowData) -> UpdateResult;
    fn is_installed(&self, data: &WorkflowData) -> UpdateResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandlerMethod {
    Download,
    Install,
    Apply,
    Cancel,
    IsInstalled,
}

impl HandlerMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Install => "install",
            Self::Apply => "apply",
            Self::Cancel => "cancel",
            Self::IsInstalled => "isInstalled",
        }
    }

    pub fn invoke(self, handler: &dyn ContentHandler, data: &WorkflowData) -> UpdateResult {
        match self {
            Self::Download => handler.download(data),
            Self::Install => handler.install(data),
            Self::Apply => handler.apply(data),
            Self::Cancel => handler.cancel(data),
            Self::IsInstalled => handler.is_installed(data),
        }
    }

    pub fn success_code(self) -> i32 {
        match self {
            Self::Download => codes::DOWNLOAD_SUCCESS,
            Self::Install => codes::INSTALL_SUCCESS,
            Self::Apply => codes::APPLY_SUCCESS,
            Self::Cancel => codes::CANCEL_SUCCESS,
            Self::IsInstalled => codes::IS_INSTALLED_NOT_INSTALLED,
        }
    }

    /// Download and install may be skipped for content already on the device.
    pub fn skippable_when_installed(self) -> bool {
        matches!(self, Self::Download | Self::Install)
    }

    pub fn skipped_code(self) -> Option<i32> {
        match self {
            Self::Download => Some(codes::DOWNLOAD_SKIPPED_UPDATE_ALREADY_INSTALLED),
            Self::Install => Some(codes::INSTALL_SKIPPED_UPDATE_ALREADY_INSTALLED),
            _ => None,
        }
    }
}

impl std::fmt::Display for HandlerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Apt,
    Swupdate,
    Script,
    MultiStep,
    Simulator,
}

impl HandlerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Swupdate => "swupdate",
            Self::Script => "script",
            Self::MultiStep => "multi_step",
            Self::Simulator => "simulator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractInfo {
    pub major: u32,
    pub minor: u32,
}

impl ContractInfo {
    pub const CURRENT: ContractInfo = ContractInfo {
        major: SUPPORTED_CONTRACT_MAJOR,
        minor: 0,
    };

    pub fn is_supported(&self) -> bool {
        self.major == SUPPORTED_CONTRACT_MAJOR
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("no content handler registered for update type `{update_type}`")]
    UnknownUpdateType { update_type: String },
    #[error("handler for `{update_type}` uses unsupported contract {major}.{minor}")]
    UnsupportedContract {
        update_type: String,
        major: u32,
        minor: u32,
    },
    #[error("failed to create handler for `{update_type}`: {reason}")]
    CreateFailed { update_type: String, reason: String },
    #[error("handler cache lock poisoned")]
    CachePoisoned,
}

impl HandlerError {
    pub fn extended_result_code(&self) -> i32 {
        match self {
            Self::UnknownUpdateType { .. } => erc::HANDLER_UNKNOWN_UPDATE_TYPE,
            Self::UnsupportedContract { .. } => erc::HANDLER_CONTRACT_UNSUPPORTED,
            Self::CreateFailed { .. } => erc::HANDLER_CREATE_FAILURE,
            Self::CachePoisoned => erc::HANDLER_CACHE_UNAVAILABLE,
        }
    }

    pub fn to_update_result(&self) -> UpdateResult {
        UpdateResult::load_failure(self.extended_result_code())
    }
}
