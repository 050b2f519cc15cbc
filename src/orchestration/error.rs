use crate::shared::erc;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("notification is not valid json: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    #[error("notification carries reserved field `{field}`")]
    ReservedField { field: String },
    #[error("multi-step nesting depth {depth} exceeds {max}")]
    StepsTooDeep { depth: usize, max: usize },
    #[error("`{action}` notification has no workflow id")]
    MissingWorkflowId { action: String },
    #[error("deployment `{workflow_id}` has no update type")]
    MissingUpdateType { workflow_id: String },
    #[error("failed to create work folder {path}: {source}")]
    WorkFolder {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("workflow step `{step}` has no step table entry")]
    UnsupportedStep { step: String },
    #[error("failed to encode queue payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("queue `{queue}` rejected an item")]
    EnqueueRejected { queue: String },
}

impl WorkflowError {
    pub fn extended_result_code(&self) -> i32 {
        match self {
            Self::MissingUpdateType { .. } => erc::WORKFLOW_MISSING_UPDATE_TYPE,
            Self::WorkFolder { .. } => erc::WORKFLOW_WORK_FOLDER_FAILURE,
            Self::UnsupportedStep { .. } => erc::WORKFLOW_UNSUPPORTED_STEP,
            Self::Encode(_) | Self::EnqueueRejected { .. } => erc::WORKFLOW_ENQUEUE_FAILURE,
            Self::InvalidPayload(_)
            | Self::ReservedField { .. }
            | Self::StepsTooDeep { .. }
            | Self::MissingWorkflowId { .. } => {
                erc::WORKFLOW_INVALID_PAYLOAD
            }
        }
    }
}
