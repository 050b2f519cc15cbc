use super::{StepSpec, UpdateAction, UpdateNotification, UpdateState, WorkflowStep};
use crate::handlers::{HandlerMethod, StepOutcome, WorkflowData};
use crate::shared::{UpdateResult, WorkflowId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRecord {
    pub index: usize,
    pub update_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_method: Option<HandlerMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<UpdateResult>,
    #[serde(default)]
    pub skipped: bool,
}

/// The deployment the update worker is currently driving.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub current_action: UpdateAction,
    pub workflow_step: WorkflowStep,
    pub state: UpdateState,
    pub result: UpdateResult,
    pub retry_token: Option<String>,
    pub update_type: Option<String>,
    pub installed_criteria: Option<String>,
    pub handler_properties: serde_json::Value,
    pub steps: Vec<StepSpec>,
    pub children: Vec<ChildRecord>,
    pub reboot_pending: bool,
    /// Step of the continuation item this record is waiting for.
    pub awaiting: Option<WorkflowStep>,
    pub work_folder: PathBuf,
}

impl WorkflowRecord {
    pub fn from_notification(
        id: WorkflowId,
        notification: &UpdateNotification,
        work_folder: PathBuf,
    ) -> Self {
        let children = notification
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| ChildRecord {
                index,
                update_type: step.update_type.clone(),
                last_method: None,
                result: None,
                skipped: false,
            })
            .collect();
        Self {
            id,
            current_action: notification.action,
            workflow_step: super::get_workflow_step(notification.action),
            state: UpdateState::Idle,
            result: UpdateResult::default(),
            retry_token: notification.retry_token.clone(),
            update_type: notification.update_type.clone(),
            installed_criteria: notification.installed_criteria.clone(),
            handler_properties: notification.handler_properties.clone(),
            steps: notification.steps.clone(),
            children,
            reboot_pending: false,
            awaiting: None,
            work_folder,
        }
    }

    /// Same deployment instance: same id and action, and the incoming token
    /// (if any) is the one this record is running.
    pub fn matches_instance(
        &self,
        id: Option<&WorkflowId>,
        action: UpdateAction,
        retry_token: Option<&str>,
    ) -> bool {
        id == Some(&self.id)
            && action == self.current_action
            && token_matches(retry_token, self.retry_token.as_deref())
    }

    pub fn workflow_data(&self) -> WorkflowData {
        let mut data = WorkflowData::new(
            self.id.as_str(),
            self.update_type.as_deref().unwrap_or_default(),
            self.work_folder.clone(),
        );
        data.retry_token = self.retry_token.clone();
        data.installed_criteria = self.installed_criteria.clone();
        data.handler_properties = self.handler_properties.clone();
        data.steps = child_data(
            self.id.as_str(),
            self.retry_token.as_deref(),
            &self.steps,
            &self.work_folder,
        );
        data
    }

    pub fn apply_outcomes(&mut self, outcomes: Vec<StepOutcome>) {
        for outcome in outcomes {
            if let Some(child) = self.children.get_mut(outcome.index) {
                child.last_method = Some(outcome.method);
                child.result = Some(outcome.result);
                child.skipped = outcome.skipped;
            }
        }
    }

    pub fn summary(&self) -> CompletedWorkflow {
        CompletedWorkflow {
            id: self.id.clone(),
            action: self.current_action,
            retry_token: self.retry_token.clone(),
            state: self.state,
            result: self.result,
        }
    }
}

fn child_data(
    workflow_id: &str,
    retry_token: Option<&str>,
    steps: &[StepSpec],
    parent_folder: &Path,
) -> Vec<WorkflowData> {
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let folder = parent_folder.join(format!("step-{index}"));
            let mut data = WorkflowData::new(workflow_id, &step.update_type, folder.clone());
            data.retry_token = retry_token.map(str::to_string);
            data.installed_criteria = step.installed_criteria.clone();
            data.handler_properties = step.handler_properties.clone();
            data.steps = child_data(workflow_id, retry_token, &step.steps, &folder);
            data
        })
        .collect()
}

fn token_matches(incoming: Option<&str>, recorded: Option<&str>) -> bool {
    match incoming {
        Some(token) => Some(token) == recorded,
        None => true,
    }
}

/// What is kept of a retired record so repeats of it are still recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedWorkflow {
    pub id: WorkflowId,
    pub action: UpdateAction,
    pub retry_token: Option<String>,
    pub state: UpdateState,
    pub result: UpdateResult,
}

impl CompletedWorkflow {
    pub fn matches_instance(
        &self,
        id: Option<&WorkflowId>,
        action: UpdateAction,
        retry_token: Option<&str>,
    ) -> bool {
        id == Some(&self.id)
            && action == self.action
            && token_matches(retry_token, self.retry_token.as_deref())
    }
}
