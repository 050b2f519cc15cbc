use crate::executor::ExecutorAction;
use crate::handlers::HandlerMethod;
use serde::{Deserialize, Serialize};

/// Desired action carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateAction {
    ProcessDeployment,
    Cancel,
    Rollback,
    Reboot,
}

impl UpdateAction {
    pub const ALL: [UpdateAction; 4] = [
        Self::ProcessDeployment,
        Self::Cancel,
        Self::Rollback,
        Self::Reboot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProcessDeployment => "ProcessDeployment",
            Self::Cancel => "Cancel",
            Self::Rollback => "Rollback",
            Self::Reboot => "Reboot",
        }
    }
}

impl std::fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStep {
    Initialize,
    Download,
    Install,
    Apply,
    Cancel,
    Rollback,
    Reboot,
    Execute,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 8] = [
        Self::Initialize,
        Self::Download,
        Self::Install,
        Self::Apply,
        Self::Cancel,
        Self::Rollback,
        Self::Reboot,
        Self::Execute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::Download => "Download",
            Self::Install => "Install",
            Self::Apply => "Apply",
            Self::Cancel => "Cancel",
            Self::Rollback => "Rollback",
            Self::Reboot => "Reboot",
            Self::Execute => "Execute",
        }
    }

    pub fn executor_action(self) -> ExecutorAction {
        match self {
            Self::Initialize => ExecutorAction::Initialize,
            Self::Download => ExecutorAction::Download,
            Self::Install => ExecutorAction::Install,
            Self::Apply => ExecutorAction::Apply,
            Self::Cancel => ExecutorAction::Cancel,
            Self::Rollback => ExecutorAction::Rollback,
            Self::Reboot => ExecutorAction::Reboot,
            Self::Execute => ExecutorAction::Execute,
        }
    }

    /// Content handler method behind the step, if the step is handler-backed.
    pub fn handler_method(self) -> Option<HandlerMethod> {
        match self {
            Self::Download => Some(HandlerMethod::Download),
            Self::Install => Some(HandlerMethod::Install),
            Self::Apply => Some(HandlerMethod::Apply),
            Self::Cancel => Some(HandlerMethod::Cancel),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpdateState {
    #[default]
    Idle,
    DeploymentInProgress,
    DownloadStarted,
    DownloadSucceeded,
    InstallStarted,
    InstallSucceeded,
    ApplyStarted,
    ApplySucceeded,
    RollbackStarted,
    RebootStarted,
    Failed,
    Succeeded,
}

impl UpdateState {
    pub const ALL: [UpdateState; 12] = [
        Self::Idle,
        Self::DeploymentInProgress,
        Self::DownloadStarted,
        Self::DownloadSucceeded,
        Self::InstallStarted,
        Self::InstallSucceeded,
        Self::ApplyStarted,
        Self::ApplySucceeded,
        Self::RollbackStarted,
        Self::RebootStarted,
        Self::Failed,
        Self::Succeeded,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Succeeded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::DeploymentInProgress => "DeploymentInProgress",
            Self::DownloadStarted => "DownloadStarted",
            Self::DownloadSucceeded => "DownloadSucceeded",
            Self::InstallStarted => "InstallStarted",
            Self::InstallSucceeded => "InstallSucceeded",
            Self::ApplyStarted => "ApplyStarted",
            Self::ApplySucceeded => "ApplySucceeded",
            Self::RollbackStarted => "RollbackStarted",
            Self::RebootStarted => "RebootStarted",
            Self::Failed => "Failed",
            Self::Succeeded => "Succeeded",
        }
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
