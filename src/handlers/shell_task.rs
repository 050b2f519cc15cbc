use super::{ContentHandler, HandlerMethod, WorkflowData};
use crate::executor::{
    sha256_hex, write_target_data, AllowedUpdateType, ExecutorAction, ExecutorRunner,
};
use crate::shared::{atomic_write_file, codes, erc, RuntimeLog, UpdateResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const INSTALLED_DIR: &str = "installed";

/// Handler for update types whose privileged work runs in the executor
/// (apt, swupdate, script). Each method writes its target data into the
/// work folder and runs one executor action.
#[derive(Debug)]
pub struct ShellTaskHandler {
    executor_type: AllowedUpdateType,
    executor: Arc<ExecutorRunner>,
    log: RuntimeLog,
    data_folder: PathBuf,
}

impl ShellTaskHandler {
    pub fn new(
        executor_type: AllowedUpdateType,
        executor: Arc<ExecutorRunner>,
        log: RuntimeLog,
        data_folder: PathBuf,
    ) -> Self {
        Self {
            executor_type,
            executor,
            log,
            data_folder,
        }
    }

    /// `<data_folder>/installed/<sha256 of update type>`; its content is the
    /// installed criteria recorded by the last successful apply.
    pub fn installed_marker_path(data_folder: &Path, update_type: &str) -> PathBuf {
        data_folder
            .join(INSTALLED_DIR)
            .join(sha256_hex(update_type.as_bytes()))
    }

    fn run_action(
        &self,
        data: &WorkflowData,
        method: HandlerMethod,
        action: ExecutorAction,
    ) -> UpdateResult {
        let target = serde_json::json!({
            "workflowId": data.workflow_id,
            "updateType": data.update_type,
            "action": action.as_str(),
            "retryToken": data.retry_token,
            "installedCriteria": data.installed_criteria,
            "workFolder": data.work_folder.display().to_string(),
            "handlerProperties": data.handler_properties,
        });
        let file = match write_target_data(&data.work_folder, action, &target) {
            Ok(file) => file,
            Err(err) => {
                self.log.error("handler.target_data", &err.to_string());
                return UpdateResult::failure(erc::HANDLER_TARGET_DATA_WRITE_FAILURE);
            }
        };
        self.executor.run_for_result(
            self.executor_type,
            action,
            &file.path,
            method.success_code(),
        )
    }

    fn record_installed(&self, data: &WorkflowData) -> UpdateResult {
        let Some(criteria) = data.installed_criteria.as_deref() else {
            return UpdateResult::success(codes::APPLY_SUCCESS);
        };
        let marker = Self::installed_marker_path(&self.data_folder, &data.update_type);
        match atomic_write_file(&marker, criteria.as_bytes()) {
            Ok(()) => UpdateResult::success(codes::APPLY_SUCCESS),
            Err(err) => {
                self.log.error(
                    "handler.installed_criteria",
                    &format!("failed to write {}: {err}", marker.display()),
                );
                UpdateResult::failure(erc::HANDLER_INSTALLED_CRITERIA_PERSIST_FAILURE)
            }
        }
    }
}

impl ContentHandler for ShellTaskHandler {
    fn download(&self, data: &WorkflowData) -> UpdateResult {
        self.run_action(data, HandlerMethod::Download, ExecutorAction::Download)
    }

    fn install(&self, data: &WorkflowData) -> UpdateResult {
        self.run_action(data, HandlerMethod::Install, ExecutorAction::Install)
    }

    fn apply(&self, data: &WorkflowData) -> UpdateResult {
        let result = self.run_action(data, HandlerMethod::Apply, ExecutorAction::Apply);
        if !result.is_success() {
            return result;
        }
        self.record_installed(data)
    }

    fn cancel(&self, data: &WorkflowData) -> UpdateResult {
        self.run_action(data, HandlerMethod::Cancel, ExecutorAction::Cancel)
    }

    fn is_installed(&self, data: &WorkflowData) -> UpdateResult {
        let Some(criteria) = data.installed_criteria.as_deref() else {
            return UpdateResult::success(codes::IS_INSTALLED_NOT_INSTALLED);
        };
        let marker = Self::installed_marker_path(&self.data_folder, &data.update_type);
        match fs::read_to_string(&marker) {
            Ok(recorded) if recorded == criteria => {
                UpdateResult::success(codes::IS_INSTALLED_INSTALLED)
            }
            _ => UpdateResult::success(codes::IS_INSTALLED_NOT_INSTALLED),
        }
    }
}
