use super::decision::{
    is_duplicate_request, is_retry_applicable, is_workflow_complete, should_not_report_to_cloud,
};
use super::{
    CompletedWorkflow, Continuation, StateReport, StepTable, StepTables, UpdateAction,
    UpdateNotification, UpdateState, WorkflowError, WorkflowRecord, WorkflowStep,
};
use crate::executor::{write_target_data, AllowedUpdateType, ExecutorRunner};
use crate::handlers::{HandlerDispatcher, HandlerMethod};
use crate::queue::{QueueSender, WorkItem};
use crate::runtime::WorkProcessor;
use crate::shared::{codes, erc, RuntimeLog, UpdateResult, WorkflowId};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// What happened to one dequeued notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Invalid,
    Duplicate,
    RetryNotApplicable,
    AlreadyInProgress,
    StaleContinuation,
    Processed { state: UpdateState },
}

/// Everything the state machine needs from the agent context.
#[derive(Debug, Clone)]
pub struct StateMachineParts {
    pub dispatcher: Arc<HandlerDispatcher>,
    pub executor: Arc<ExecutorRunner>,
    pub updates: QueueSender,
    pub reports: QueueSender,
    pub log: RuntimeLog,
    pub downloads_folder: PathBuf,
    /// Used for deployments that arrive without `updateType`.
    pub default_update_type: Option<String>,
    pub step_tables: StepTables,
}

/// Update-worker processor that owns the workflow record.
///
/// Each auto-transition step runs from its own continuation item on the
/// update queue, so a cancel or a replacing deployment queued while a step
/// was running is handled before the next step starts.
#[derive(Debug)]
pub struct WorkflowStateMachine {
    dispatcher: Arc<HandlerDispatcher>,
    executor: Arc<ExecutorRunner>,
    updates: QueueSender,
    reports: QueueSender,
    log: RuntimeLog,
    downloads_folder: PathBuf,
    default_update_type: Option<String>,
    step_tables: StepTables,
    agent_state: UpdateState,
    agent_result: UpdateResult,
    current: Option<WorkflowRecord>,
    last_completed: Option<CompletedWorkflow>,
}

impl WorkflowStateMachine {
    pub fn new(parts: StateMachineParts) -> Self {
        Self {
            dispatcher: parts.dispatcher,
            executor: parts.executor,
            updates: parts.updates,
            reports: parts.reports,
            log: parts.log,
            downloads_folder: parts.downloads_folder,
            default_update_type: parts.default_update_type,
            step_tables: parts.step_tables,
            agent_state: UpdateState::Idle,
            agent_result: UpdateResult::default(),
            current: None,
            last_completed: None,
        }
    }

    pub fn agent_state(&self) -> UpdateState {
        self.agent_state
    }

    pub fn agent_result(&self) -> UpdateResult {
        self.agent_result
    }

    pub fn current(&self) -> Option<&WorkflowRecord> {
        self.current.as_ref()
    }

    pub fn last_completed(&self) -> Option<&CompletedWorkflow> {
        self.last_completed.as_ref()
    }

    /// Internal items are continuations this machine scheduled; every other
    /// item is an external notification.
    pub fn handle_item(&mut self, item: &WorkItem) -> ProcessOutcome {
        if !item.is_internal() {
            return self.handle_payload(&item.payload);
        }
        match Continuation::parse(&item.payload) {
            Ok(continuation) => self.handle_continuation(continuation),
            Err(err) => {
                self.log.error("workflow.invalid_continuation", &err.to_string());
                ProcessOutcome::Invalid
            }
        }
    }

    /// Handles one external notification.
    pub fn handle_payload(&mut self, payload: &str) -> ProcessOutcome {
        match UpdateNotification::parse(payload) {
            Ok(notification) => self.handle_request(notification),
            Err(err) => {
                self.log.warn("workflow.invalid_payload", &err.to_string());
                ProcessOutcome::Invalid
            }
        }
    }

    fn handle_request(&mut self, notification: UpdateNotification) -> ProcessOutcome {
        let action = notification.action;
        let target = self.target_id(&notification);
        let token = notification.retry_token.as_deref();

        let last_state = self.last_reported_state(action, target.as_ref(), token);
        if is_duplicate_request(action, last_state) {
            self.log.info(
                "workflow.duplicate",
                &format!("{action} {} last_state={last_state}", describe(target.as_ref())),
            );
            return ProcessOutcome::Duplicate;
        }

        let current_token = self.current_token(action, target.as_ref());
        if !is_retry_applicable(current_token, token) {
            self.log.info(
                "workflow.retry_not_applicable",
                &format!(
                    "{action} {} token={}",
                    describe(target.as_ref()),
                    token.unwrap_or("-")
                ),
            );
            return ProcessOutcome::RetryNotApplicable;
        }

        if action == UpdateAction::Cancel {
            return self.cancel();
        }
        let Some(id) = target else {
            self.log.warn(
                "workflow.invalid_payload",
                &WorkflowError::MissingWorkflowId {
                    action: action.to_string(),
                }
                .to_string(),
            );
            return ProcessOutcome::Invalid;
        };

        if token.is_none() {
            if let Some(record) = &self.current {
                if record.id == id && record.current_action == action && !record.state.is_terminal() {
                    self.log.info(
                        "workflow.in_progress",
                        &format!("{action} {id} state={}", record.state),
                    );
                    return ProcessOutcome::AlreadyInProgress;
                }
            }
        }

        self.begin(id, &notification)
    }

    /// Rollback and reboot may omit the id and then target the most recent
    /// deployment.
    fn target_id(&self, notification: &UpdateNotification) -> Option<WorkflowId> {
        if let Some(id) = &notification.id {
            return Some(id.clone());
        }
        match notification.action {
            UpdateAction::Rollback | UpdateAction::Reboot => self
                .current
                .as_ref()
                .map(|record| record.id.clone())
                .or_else(|| self.last_completed.as_ref().map(|done| done.id.clone())),
            _ => None,
        }
    }

    fn last_reported_state(
        &self,
        action: UpdateAction,
        id: Option<&WorkflowId>,
        token: Option<&str>,
    ) -> UpdateState {
        if action == UpdateAction::Cancel {
            return self.agent_state;
        }
        if let Some(record) = &self.current {
            if record.matches_instance(id, action, token) {
                return record.state;
            }
        }
        if let Some(done) = &self.last_completed {
            if done.matches_instance(id, action, token) {
                return done.state;
            }
        }
        UpdateState::Idle
    }

    fn current_token(&self, action: UpdateAction, id: Option<&WorkflowId>) -> Option<&str> {
        if let Some(record) = &self.current {
            if record.matches_instance(id, action, None) {
                return record.retry_token.as_deref();
            }
        }
        self.last_completed
            .as_ref()
            .filter(|done| done.matches_instance(id, action, None))
            .and_then(|done| done.retry_token.as_deref())
    }

    fn begin(&mut self, id: WorkflowId, notification: &UpdateNotification) -> ProcessOutcome {
        self.supersede(&id, notification.action);

        let work_folder = self.downloads_folder.join(id.as_str());
        let mut record = WorkflowRecord::from_notification(id, notification, work_folder.clone());
        if record.current_action == UpdateAction::ProcessDeployment && record.update_type.is_none()
        {
            if let Some(default) = &self.default_update_type {
                self.log.info(
                    "workflow.default_update_type",
                    &format!("{} {default}", record.id),
                );
                record.update_type = Some(default.clone());
            }
        }
        let first_step = record.workflow_step;
        let has_update_type = record.update_type.is_some();
        self.current = Some(record);

        if notification.action == UpdateAction::ProcessDeployment {
            self.transition(
                UpdateState::DeploymentInProgress,
                UpdateResult::success(codes::DEPLOYMENT_IN_PROGRESS_SUCCESS),
            );
            if !has_update_type {
                return self.fail(WorkflowError::MissingUpdateType {
                    workflow_id: self.current_id(),
                });
            }
        }
        if let Err(source) = fs::create_dir_all(&work_folder) {
            return self.fail(WorkflowError::WorkFolder {
                path: work_folder.display().to_string(),
                source,
            });
        }

        self.run_step(first_step)
    }

    /// Cancels a record that a new request replaces and reports its terminal
    /// state, so the replaced deployment never stays in progress.
    fn supersede(&mut self, replacement: &WorkflowId, action: UpdateAction) {
        let Some(previous) = self.current.as_mut() else {
            return;
        };
        if previous.state.is_terminal() {
            self.retire();
            return;
        }

        previous.awaiting = None;
        let data = previous.workflow_data();
        let cancelled = previous.update_type.as_deref().map(|update_type| {
            self.dispatcher
                .dispatch(update_type, HandlerMethod::Cancel, &data)
        });
        previous.apply_outcomes(data.outcomes.snapshot());
        previous.workflow_step = WorkflowStep::Cancel;
        self.log.info(
            "workflow.superseded",
            &format!(
                "{} {} replaced by {action} {replacement} cancel={}",
                previous.current_action,
                previous.id,
                cancelled
                    .map(|result| result.to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
        );
        self.transition(
            UpdateState::Failed,
            UpdateResult::new(codes::FAILURE_CANCELLED, erc::WORKFLOW_REPLACED),
        );
        self.retire();
    }

    fn handle_continuation(&mut self, continuation: Continuation) -> ProcessOutcome {
        let step = continuation.step;
        let expected = self.current.as_mut().filter(|record| {
            !record.state.is_terminal()
                && record.id == continuation.id
                && record.current_action == continuation.action
                && record.retry_token == continuation.retry_token
                && record.awaiting == Some(step)
        });
        let Some(record) = expected else {
            self.log.debug(
                "workflow.stale_continuation",
                &format!("{} step={step}", continuation.id),
            );
            return ProcessOutcome::StaleContinuation;
        };
        record.awaiting = None;
        self.run_step(step)
    }

    /// Table for the update type of the record in progress.
    fn step_table(&self) -> &StepTable {
        self.step_tables.for_update_type(
            self.current
                .as_ref()
                .and_then(|record| record.update_type.as_deref()),
        )
    }

    fn run_step(&mut self, step: WorkflowStep) -> ProcessOutcome {
        let Some(entry) = self.step_table().entry(step).copied() else {
            return self.fail(WorkflowError::UnsupportedStep {
                step: step.to_string(),
            });
        };
        if let Some(record) = self.current.as_mut() {
            record.workflow_step = step;
        }
        self.transition(entry.started, self.agent_result);

        if step == WorkflowStep::Download && self.already_installed() {
            self.transition(
                UpdateState::Succeeded,
                UpdateResult::success(codes::DOWNLOAD_SKIPPED_UPDATE_ALREADY_INSTALLED),
            );
            self.retire();
            return self.processed();
        }

        let result = self.execute(step);
        if !result.is_success() {
            self.transition(UpdateState::Failed, result);
            self.retire();
            return self.processed();
        }

        let reboot_pending = match self.current.as_mut() {
            Some(record) => {
                record.reboot_pending |= result.requires_reboot();
                record.reboot_pending
            }
            None => false,
        };
        self.transition(entry.on_success, result);

        let complete = is_workflow_complete(self.step_table(), step);
        let next = self.step_table().next_step(step, reboot_pending);
        match next {
            Some(next) => {
                if complete {
                    self.log.info(
                        "workflow.reboot_required",
                        &format!("{} after {step}", self.current_id()),
                    );
                }
                self.schedule(next)
            }
            None => {
                if !entry.on_success.is_terminal() {
                    self.transition(UpdateState::Succeeded, result);
                }
                self.retire();
                self.processed()
            }
        }
    }

    fn already_installed(&self) -> bool {
        let Some(record) = self.current.as_ref() else {
            return false;
        };
        let Some(update_type) = record.update_type.as_deref() else {
            return false;
        };
        let data = record.workflow_data();
        let installed = self
            .dispatcher
            .dispatch(update_type, HandlerMethod::IsInstalled, &data);
        if installed.result_code == codes::IS_INSTALLED_INSTALLED {
            self.log.info(
                "workflow.already_installed",
                &format!("{} {update_type}", record.id),
            );
            return true;
        }
        false
    }

    fn execute(&mut self, step: WorkflowStep) -> UpdateResult {
        let Some(record) = self.current.as_ref() else {
            return UpdateResult::failure(WorkflowError::UnsupportedStep {
                step: step.to_string(),
            }
            .extended_result_code());
        };

        match (step.handler_method(), record.update_type.clone()) {
            (Some(method), Some(update_type)) => {
                let data = record.workflow_data();
                let result = self.dispatcher.dispatch(&update_type, method, &data);
                if let Some(record) = self.current.as_mut() {
                    record.apply_outcomes(data.outcomes.snapshot());
                }
                result
            }
            (Some(_), None) => UpdateResult::failure(
                WorkflowError::MissingUpdateType {
                    workflow_id: record.id.to_string(),
                }
                .extended_result_code(),
            ),
            (None, _) => self.run_common_action(step),
        }
    }

    /// Rollback and reboot go straight to the executor as `common` actions.
    fn run_common_action(&self, step: WorkflowStep) -> UpdateResult {
        let success_code = match step {
            WorkflowStep::Rollback => codes::ROLLBACK_SUCCESS,
            WorkflowStep::Reboot => codes::REBOOT_SUCCESS,
            other => {
                return UpdateResult::failure(
                    WorkflowError::UnsupportedStep {
                        step: other.to_string(),
                    }
                    .extended_result_code(),
                )
            }
        };
        let Some(record) = self.current.as_ref() else {
            return UpdateResult::failure(codes::FAILURE);
        };
        let action = step.executor_action();
        let target = serde_json::json!({
            "workflowId": record.id.as_str(),
            "action": action.as_str(),
            "retryToken": record.retry_token,
            "updateType": record.update_type,
        });
        match write_target_data(&record.work_folder, action, &target) {
            Ok(file) => self.executor.run_for_result(
                AllowedUpdateType::Common,
                action,
                &file.path,
                success_code,
            ),
            Err(err) => {
                self.log.error("workflow.target_data", &err.to_string());
                err.to_update_result()
            }
        }
    }

    fn cancel(&mut self) -> ProcessOutcome {
        let Some(mut record) = self.current.take() else {
            self.transition(
                UpdateState::Idle,
                UpdateResult::success(codes::IDLE_SUCCESS),
            );
            return self.processed();
        };

        let data = record.workflow_data();
        let result = match record.update_type.as_deref() {
            Some(update_type) => self
                .dispatcher
                .dispatch(update_type, HandlerMethod::Cancel, &data),
            None => UpdateResult::success(codes::CANCEL_SUCCESS),
        };
        record.apply_outcomes(data.outcomes.snapshot());
        record.workflow_step = WorkflowStep::Cancel;
        record.awaiting = None;
        self.log.info(
            "workflow.cancelled",
            &format!("{} during {} -> {result}", record.id, record.state),
        );
        self.current = Some(record);
        self.transition(UpdateState::Idle, result);
        self.retire();
        self.processed()
    }

    fn schedule(&mut self, next: WorkflowStep) -> ProcessOutcome {
        let Some(record) = self.current.as_mut() else {
            return self.processed();
        };
        record.awaiting = Some(next);
        let item = Continuation::new(
            record.current_action,
            &record.id,
            record.retry_token.as_deref(),
            next,
        );
        let payload = match serde_json::to_string(&item) {
            Ok(payload) => payload,
            Err(err) => return self.fail(WorkflowError::Encode(err)),
        };
        if !self.updates.send_internal(&payload) {
            return self.fail(WorkflowError::EnqueueRejected {
                queue: "update".to_string(),
            });
        }
        self.log.debug(
            "workflow.continuation",
            &format!("{} next={next}", self.current_id()),
        );
        self.processed()
    }

    fn fail(&mut self, err: WorkflowError) -> ProcessOutcome {
        self.log.error("workflow.failed", &err.to_string());
        self.transition(
            UpdateState::Failed,
            UpdateResult::failure(err.extended_result_code()),
        );
        self.retire();
        self.processed()
    }

    /// Moves the agent (and the current record, if any) to `state`; states
    /// the cloud models are enqueued for reporting exactly once.
    fn transition(&mut self, state: UpdateState, result: UpdateResult) {
        self.agent_state = state;
        self.agent_result = result;
        let report = match self.current.as_mut() {
            Some(record) => {
                record.state = state;
                record.result = result;
                StateReport::for_record(record)
            }
            None => StateReport::for_agent(state, result),
        };

        let summary = format!(
            "{} {state} {result}",
            report.workflow_id.as_deref().unwrap_or("-")
        );
        if should_not_report_to_cloud(state) {
            self.log.debug("workflow.state", &summary);
            return;
        }
        self.log.info("workflow.state", &summary);
        match serde_json::to_string(&report) {
            Ok(payload) => {
                if !self.reports.send(&payload) {
                    self.log.error("report.enqueue_failed", &summary);
                }
            }
            Err(err) => self.log.error("report.encode", &err.to_string()),
        }
    }

    fn retire(&mut self) {
        if let Some(record) = self.current.take() {
            self.log.debug(
                "workflow.retired",
                &format!("{} state={}", record.id, record.state),
            );
            self.last_completed = Some(record.summary());
        }
    }

    fn processed(&self) -> ProcessOutcome {
        ProcessOutcome::Processed {
            state: self.agent_state,
        }
    }

    fn current_id(&self) -> String {
        describe(self.current.as_ref().map(|record| &record.id))
    }
}

fn describe(id: Option<&WorkflowId>) -> String {
    id.map(WorkflowId::to_string)
        .unwrap_or_else(|| "-".to_string())
}

impl WorkProcessor for WorkflowStateMachine {
    fn process(&mut self, item: WorkItem) {
        let outcome = self.handle_item(&item);
        self.log.debug(
            "workflow.processed",
            &format!("{outcome:?} waited_ms={}", item.age().num_milliseconds()),
        );
    }
}
