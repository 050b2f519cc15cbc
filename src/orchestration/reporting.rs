use super::{ChildRecord, UpdateAction, UpdateState, WorkflowRecord, WorkflowStep};
use crate::queue::WorkItem;
use crate::runtime::WorkProcessor;
use crate::shared::{now_millis, RuntimeLog, UpdateResult};
use serde::{Deserialize, Serialize};

/// One reported state transition, as carried on the reporting queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<UpdateAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<WorkflowStep>,
    pub state: UpdateState,
    pub result: UpdateResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildRecord>,
    pub reported_at: i64,
}

impl StateReport {
    pub fn for_record(record: &WorkflowRecord) -> Self {
        Self {
            workflow_id: Some(record.id.to_string()),
            action: Some(record.current_action),
            step: Some(record.workflow_step),
            state: record.state,
            result: record.result,
            retry_token: record.retry_token.clone(),
            update_type: record.update_type.clone(),
            children: record.children.clone(),
            reported_at: now_millis(),
        }
    }

    /// Agent-level report with no deployment attached.
    pub fn for_agent(state: UpdateState, result: UpdateResult) -> Self {
        Self {
            workflow_id: None,
            action: None,
            step: None,
            state,
            result,
            retry_token: None,
            update_type: None,
            children: Vec::new(),
            reported_at: now_millis(),
        }
    }
}

/// Transport side of the reporting queue.
pub trait ReportSink: Send + 'static {
    fn deliver(&mut self, report: &StateReport) -> Result<(), String>;
}

impl<F> ReportSink for F
where
    F: FnMut(&StateReport) -> Result<(), String> + Send + 'static,
{
    fn deliver(&mut self, report: &StateReport) -> Result<(), String> {
        self(report)
    }
}

/// Reporting-worker processor: decodes queued reports and hands them to the
/// sink. A report the sink refuses is logged and dropped.
pub struct ReportingProcessor {
    sink: Box<dyn ReportSink>,
    log: RuntimeLog,
}

impl ReportingProcessor {
    pub fn new(sink: Box<dyn ReportSink>, log: RuntimeLog) -> Self {
        Self { sink, log }
    }
}

impl WorkProcessor for ReportingProcessor {
    fn process(&mut self, item: WorkItem) {
        let report: StateReport = match serde_json::from_str(&item.payload) {
            Ok(report) => report,
            Err(err) => {
                self.log
                    .error("report.decode", &format!("dropping report: {err}"));
                return;
            }
        };
        match self.sink.deliver(&report) {
            Ok(()) => self.log.debug(
                "report.delivered",
                &format!(
                    "{} {}",
                    report.workflow_id.as_deref().unwrap_or("-"),
                    report.state
                ),
            ),
            Err(err) => self.log.warn("report.delivery_failed", &err),
        }
    }
}
