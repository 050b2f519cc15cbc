use super::{UpdateAction, WorkflowError, WorkflowStep};
use crate::shared::WorkflowId;
use serde::{Deserialize, Serialize};

/// Deepest multi-step nesting accepted in a notification.
pub const MAX_STEP_DEPTH: usize = 4;

/// Field names that only the agent's own queue items may carry.
const RESERVED_FIELDS: &[&str] = &["continuation", "awaiting"];

/// Work item payload on the update queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotification {
    pub action: UpdateAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WorkflowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub handler_properties: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub update_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub handler_properties: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepSpec>,
}

/// Item the update worker enqueues for itself to run the next step of the
/// workflow in progress. Only accepted from internal queue items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Continuation {
    pub action: UpdateAction,
    pub id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_token: Option<String>,
    pub step: WorkflowStep,
}

impl Continuation {
    pub fn new(
        action: UpdateAction,
        id: &WorkflowId,
        retry_token: Option<&str>,
        step: WorkflowStep,
    ) -> Self {
        Self {
            action,
            id: id.clone(),
            retry_token: retry_token.map(str::to_string),
            step,
        }
    }

    pub fn parse(payload: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(payload).map_err(WorkflowError::InvalidPayload)
    }
}

impl UpdateNotification {
    pub fn parse(payload: &str) -> Result<Self, WorkflowError> {
        let raw: serde_json::Value =
            serde_json::from_str(payload).map_err(WorkflowError::InvalidPayload)?;
        if let Some(field) = RESERVED_FIELDS
            .iter()
            .find(|field| raw.get(**field).is_some())
        {
            return Err(WorkflowError::ReservedField {
                field: (*field).to_string(),
            });
        }
        let notification: Self =
            serde_json::from_value(raw).map_err(WorkflowError::InvalidPayload)?;
        let depth = steps_depth(&notification.steps);
        if depth > MAX_STEP_DEPTH {
            return Err(WorkflowError::StepsTooDeep {
                depth,
                max: MAX_STEP_DEPTH,
            });
        }
        Ok(notification)
    }
}

fn steps_depth(steps: &[StepSpec]) -> usize {
    steps
        .iter()
        .map(|step| 1 + steps_depth(&step.steps))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_deployment() {
        let notification =
            UpdateNotification::parse(r#"{"action":"ProcessDeployment","id":"wf-1"}"#)
                .expect("parse");
        assert_eq!(notification.action, UpdateAction::ProcessDeployment);
        assert_eq!(notification.id.as_ref().map(WorkflowId::as_str), Some("wf-1"));
        assert!(notification.steps.is_empty());
        assert!(notification.update_type.is_none());
    }

    #[test]
    fn rejects_unknown_action_and_unsafe_id() {
        assert!(UpdateNotification::parse(r#"{"action":"Format"}"#).is_err());
        assert!(UpdateNotification::parse(r#"{"action":"Cancel","id":"../x"}"#).is_err());
    }

    #[test]
    fn rejects_steps_nested_past_limit() {
        let mut steps = serde_json::json!([]);
        for _ in 0..=MAX_STEP_DEPTH {
            steps = serde_json::json!([{ "updateType": "microsoft/steps:1", "steps": steps }]);
        }
        let payload = serde_json::json!({
            "action": "ProcessDeployment",
            "id": "wf-1",
            "steps": steps,
        });
        assert!(matches!(
            UpdateNotification::parse(&payload.to_string()),
            Err(WorkflowError::StepsTooDeep { .. })
        ));
    }

    #[test]
    fn notification_may_not_carry_internal_step_fields() {
        let forged = r#"{"action":"ProcessDeployment","id":"wf-1","continuation":{"step":"Install"}}"#;
        assert!(matches!(
            UpdateNotification::parse(forged),
            Err(WorkflowError::ReservedField { field }) if field == "continuation"
        ));
    }

    #[test]
    fn continuation_payload_is_not_a_notification() {
        let id = WorkflowId::parse("wf-1").expect("id");
        let item = Continuation::new(
            UpdateAction::ProcessDeployment,
            &id,
            Some("t1"),
            WorkflowStep::Install,
        );
        let encoded = serde_json::to_string(&item).expect("encode");
        assert_eq!(Continuation::parse(&encoded).expect("decode"), item);
        assert!(Continuation::parse(r#"{"action":"ProcessDeployment","id":"wf-1"}"#).is_err());
    }
}
