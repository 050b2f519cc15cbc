//! Pure decisions taken for every dequeued notification, in this order:
//! duplicate check, retry check, step lookup. Completion and report
//! suppression are consulted as the workflow advances.

use super::{StepTable, UpdateAction, UpdateState, WorkflowStep};

/// True when `last_state` already is the outcome `action` would produce.
pub fn is_duplicate_request(action: UpdateAction, last_state: UpdateState) -> bool {
    match action {
        UpdateAction::ProcessDeployment | UpdateAction::Rollback | UpdateAction::Reboot => {
            last_state.is_terminal()
        }
        UpdateAction::Cancel => last_state == UpdateState::Idle,
    }
}

/// False only for a repeat of the token already acted on.
pub fn is_retry_applicable(current_token: Option<&str>, new_token: Option<&str>) -> bool {
    match (current_token, new_token) {
        (Some(current), Some(new)) => current != new,
        _ => true,
    }
}

pub fn get_workflow_step(action: UpdateAction) -> WorkflowStep {
    match action {
        UpdateAction::ProcessDeployment => WorkflowStep::Download,
        UpdateAction::Cancel => WorkflowStep::Cancel,
        UpdateAction::Rollback => WorkflowStep::Rollback,
        UpdateAction::Reboot => WorkflowStep::Reboot,
    }
}

/// `table` is the one for the workflow's update type, see
/// [`super::StepTables::for_update_type`].
pub fn is_workflow_complete(table: &StepTable, step: WorkflowStep) -> bool {
    table.next_step(step, false).is_none()
}

/// Only the states the cloud models are reported; step-level progress
/// stays local.
pub fn should_not_report_to_cloud(state: UpdateState) -> bool {
    !matches!(
        state,
        UpdateState::Idle
            | UpdateState::DeploymentInProgress
            | UpdateState::Failed
            | UpdateState::Succeeded
    )
}
