use super::HandlerMethod;
use crate::shared::UpdateResult;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

/// Per-dispatch view of a workflow handed to content handlers.
#[derive(Debug, Default)]
pub struct WorkflowData {
    pub workflow_id: String,
    pub update_type: String,
    pub retry_token: Option<String>,
    pub installed_criteria: Option<String>,
    pub handler_properties: serde_json::Value,
    pub work_folder: PathBuf,
    /// Ordered children of a multi-step update.
    pub steps: Vec<WorkflowData>,
    pub outcomes: StepOutcomes,
}

impl WorkflowData {
    pub fn new(workflow_id: &str, update_type: &str, work_folder: PathBuf) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            update_type: update_type.to_string(),
            handler_properties: serde_json::Value::Null,
            work_folder,
            ..Self::default()
        }
    }

    /// Looks up `handlerProperties.<key>`.
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.handler_properties.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub index: usize,
    pub update_type: String,
    pub method: HandlerMethod,
    pub result: UpdateResult,
    pub skipped: bool,
}

/// Child results recorded by a multi-step handler while it runs.
#[derive(Debug, Default)]
pub struct StepOutcomes(Mutex<Vec<StepOutcome>>);

impl StepOutcomes {
    pub fn record(&self, outcome: StepOutcome) {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(outcome);
    }

    pub fn snapshot(&self) -> Vec<StepOutcome> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}
