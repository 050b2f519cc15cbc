mod support;

use serde_json::{json, Value};
use std::fs;
use support::{dispatcher_with, write_script};
use tempfile::tempdir;
use updagent::handlers::{HandlerKind, HandlerMethod, HandlerRegistry, ShellTaskHandler, WorkflowData};
use updagent::shared::{codes, erc, UpdateResult};

const APT: &str = "microsoft/apt:1";

#[test]
fn shell_task_module_runs_executor_with_target_data_file() {
    let dir = tempdir().expect("tempdir");
    let executor = dir.path().join("upd-shell");
    let args_file = dir.path().join("args.txt");
    write_script(
        &executor,
        &format!("#!/bin/sh\necho \"$@\" > '{}'\n", args_file.display()),
    );
    let mut registry = HandlerRegistry::new();
    registry.register_kind(APT, HandlerKind::Apt);
    let dispatcher = dispatcher_with(registry, &executor, dir.path());

    let work_folder = dir.path().join("downloads/wf-1");
    let mut data = WorkflowData::new("wf-1", APT, work_folder.clone());
    data.retry_token = Some("t-1".to_string());
    data.handler_properties = json!({"packages": ["curl=8.5.0"]});

    let result = dispatcher.dispatch(APT, HandlerMethod::Download, &data);
    assert_eq!(result, UpdateResult::success(codes::DOWNLOAD_SUCCESS));

    let target_path = work_folder.join("download.target.json");
    let args = fs::read_to_string(&args_file).expect("args");
    assert_eq!(
        args.trim(),
        format!(
            "--update-type microsoft/apt --update-action download --target-data {}",
            target_path.display()
        )
    );
    let target: Value =
        serde_json::from_str(&fs::read_to_string(&target_path).expect("target")).expect("json");
    assert_eq!(target["workflowId"], "wf-1");
    assert_eq!(target["action"], "download");
    assert_eq!(target["retryToken"], "t-1");
    assert_eq!(target["handlerProperties"]["packages"][0], "curl=8.5.0");
}

#[test]
fn shell_task_module_records_installed_criteria_after_apply() {
    let dir = tempdir().expect("tempdir");
    let executor = dir.path().join("upd-shell");
    write_script(&executor, "#!/bin/sh\nexit 0\n");
    let mut registry = HandlerRegistry::new();
    registry.register_kind(APT, HandlerKind::Apt);
    let dispatcher = dispatcher_with(registry, &executor, dir.path());

    let mut data = WorkflowData::new("wf-1", APT, dir.path().join("downloads/wf-1"));
    data.installed_criteria = Some("curl=8.5.0".to_string());

    assert_eq!(
        dispatcher
            .dispatch(APT, HandlerMethod::IsInstalled, &data)
            .result_code,
        codes::IS_INSTALLED_NOT_INSTALLED
    );
    assert_eq!(
        dispatcher.dispatch(APT, HandlerMethod::Apply, &data),
        UpdateResult::success(codes::APPLY_SUCCESS)
    );
    assert_eq!(
        fs::read_to_string(ShellTaskHandler::installed_marker_path(dir.path(), APT))
            .expect("marker"),
        "curl=8.5.0"
    );
    assert_eq!(
        dispatcher
            .dispatch(APT, HandlerMethod::IsInstalled, &data)
            .result_code,
        codes::IS_INSTALLED_INSTALLED
    );

    data.installed_criteria = Some("curl=8.6.0".to_string());
    assert_eq!(
        dispatcher
            .dispatch(APT, HandlerMethod::IsInstalled, &data)
            .result_code,
        codes::IS_INSTALLED_NOT_INSTALLED
    );
}

#[test]
fn shell_task_module_failed_executor_is_not_recorded_as_installed() {
    let dir = tempdir().expect("tempdir");
    let executor = dir.path().join("upd-shell");
    write_script(&executor, "#!/bin/sh\nexit 12\n");
    let mut registry = HandlerRegistry::new();
    registry.register_kind(APT, HandlerKind::Apt);
    let dispatcher = dispatcher_with(registry, &executor, dir.path());

    let mut data = WorkflowData::new("wf-1", APT, dir.path().join("downloads/wf-1"));
    data.installed_criteria = Some("curl=8.5.0".to_string());

    let result = dispatcher.dispatch(APT, HandlerMethod::Apply, &data);
    assert_eq!(result, UpdateResult::failure(erc::executor_exit(12)));
    assert!(!ShellTaskHandler::installed_marker_path(dir.path(), APT).exists());
}
