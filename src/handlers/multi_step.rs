use super::{ContentHandler, HandlerDispatcher, HandlerMethod, StepOutcome, WorkflowData};
use crate::shared::{codes, erc, RuntimeLog, UpdateResult};
use std::sync::Weak;

/// Runs the ordered child steps of a multi-step update through the
/// dispatcher, one child type at a time.
#[derive(Debug)]
pub struct MultiStepHandler {
    dispatcher: Weak<HandlerDispatcher>,
    log: RuntimeLog,
}

impl MultiStepHandler {
    pub fn new(dispatcher: Weak<HandlerDispatcher>, log: RuntimeLog) -> Self {
        Self { dispatcher, log }
    }

    fn run_children(&self, data: &WorkflowData, method: HandlerMethod) -> UpdateResult {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return UpdateResult::failure(erc::MULTI_STEP_DISPATCHER_UNAVAILABLE);
        };

        let mut reboot: Option<UpdateResult> = None;
        let mut skipped = 0usize;
        for (index, child) in data.steps.iter().enumerate() {
            if method.skippable_when_installed() {
                let installed = dispatcher.dispatch(&child.update_type, HandlerMethod::IsInstalled, child);
                if installed.is_load_failure() {
                    record(data, index, child, method, installed, false);
                    return installed;
                }
                if installed.result_code == codes::IS_INSTALLED_INSTALLED {
                    self.log.info(
                        "multistep.skip",
                        &format!(
                            "workflow={} step={} type={} already installed",
                            data.workflow_id, index, child.update_type
                        ),
                    );
                    let skipped_result =
                        UpdateResult::success(method.skipped_code().unwrap_or(method.success_code()));
                    record(data, index, child, method, skipped_result, true);
                    skipped += 1;
                    continue;
                }
            }

            let result = dispatcher.dispatch(&child.update_type, method, child);
            record(data, index, child, method, result, false);
            if !result.is_success() {
                self.log.warn(
                    "multistep.abort",
                    &format!(
                        "workflow={} step={} type={} {method} -> {result}",
                        data.workflow_id, index, child.update_type
                    ),
                );
                return result;
            }
            if result.requires_reboot() && !is_immediate(reboot) {
                reboot = Some(result);
            }
        }

        if let Some(result) = reboot {
            return result;
        }
        match method.skipped_code() {
            Some(code) if !data.steps.is_empty() && skipped == data.steps.len() => {
                UpdateResult::success(code)
            }
            _ => UpdateResult::success(method.success_code()),
        }
    }
}

fn is_immediate(result: Option<UpdateResult>) -> bool {
    matches!(
        result.map(|r| r.result_code),
        Some(codes::INSTALL_REQUIRED_IMMEDIATE_REBOOT | codes::APPLY_REQUIRED_IMMEDIATE_REBOOT)
    )
}

fn record(
    parent: &WorkflowData,
    index: usize,
    child: &WorkflowData,
    method: HandlerMethod,
    result: UpdateResult,
    skipped: bool,
) {
    parent.outcomes.record(StepOutcome {
        index,
        update_type: child.update_type.clone(),
        method,
        result,
        skipped,
    });
}

impl ContentHandler for MultiStepHandler {
    fn download(&self, data: &WorkflowData) -> UpdateResult {
        self.run_children(data, HandlerMethod::Download)
    }

    fn install(&self, data: &WorkflowData) -> UpdateResult {
        self.run_children(data, HandlerMethod::Install)
    }

    fn apply(&self, data: &WorkflowData) -> UpdateResult {
        self.run_children(data, HandlerMethod::Apply)
    }

    /// Cancels every child, even after one refuses; the first refusal is
    /// returned.
    fn cancel(&self, data: &WorkflowData) -> UpdateResult {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return UpdateResult::failure(erc::MULTI_STEP_DISPATCHER_UNAVAILABLE);
        };
        let mut first_failure = None;
        for (index, child) in data.steps.iter().enumerate() {
            let result = dispatcher.dispatch(&child.update_type, HandlerMethod::Cancel, child);
            record(data, index, child, HandlerMethod::Cancel, result, false);
            if !result.is_success() && first_failure.is_none() {
                first_failure = Some(result);
            }
        }
        first_failure.unwrap_or(UpdateResult::success(codes::CANCEL_SUCCESS))
    }

    fn is_installed(&self, data: &WorkflowData) -> UpdateResult {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return UpdateResult::failure(erc::MULTI_STEP_DISPATCHER_UNAVAILABLE);
        };
        if data.steps.is_empty() {
            return UpdateResult::success(codes::IS_INSTALLED_NOT_INSTALLED);
        }
        for child in &data.steps {
            let result = dispatcher.dispatch(&child.update_type, HandlerMethod::IsInstalled, child);
            if result.result_code != codes::IS_INSTALLED_INSTALLED {
                return result;
            }
        }
        UpdateResult::success(codes::IS_INSTALLED_INSTALLED)
    }
}
