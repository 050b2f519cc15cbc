mod support;

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use support::{call_log, calls, dispatcher_with, write_script, CallLog, ScriptedExtension};
use tempfile::{tempdir, TempDir};
use updagent::executor::ExecutorRunner;
use updagent::handlers::{HandlerKind, HandlerMethod, HandlerRegistry};
use updagent::orchestration::{
    DeploymentStep, ProcessOutcome, StateMachineParts, StateReport, StepTable, StepTables,
    UpdateAction, UpdateState, WorkflowStateMachine,
};
use updagent::queue::{QueueSender, WorkQueueHandle, WorkQueueRegistry};
use updagent::shared::{codes, erc, RuntimeLog, UpdateResult};

const PKG: &str = "test/pkg:1";

struct Harness {
    dir: TempDir,
    machine: WorkflowStateMachine,
    queues: Arc<WorkQueueRegistry>,
    updates: WorkQueueHandle,
    reports: WorkQueueHandle,
    calls: CallLog,
}

impl Harness {
    fn new(pkg: impl FnOnce(&CallLog) -> ScriptedExtension) -> Self {
        Self::with_executor(pkg, "#!/bin/sh\nexit 0\n")
    }

    fn with_executor(pkg: impl FnOnce(&CallLog) -> ScriptedExtension, script: &str) -> Self {
        Self::with_parts(pkg, script, None, StepTables::new())
    }

    fn with_parts(
        pkg: impl FnOnce(&CallLog) -> ScriptedExtension,
        script: &str,
        default_update_type: Option<&str>,
        step_tables: StepTables,
    ) -> Self {
        let dir = tempdir().expect("tempdir");
        let executor = dir.path().join("upd-shell");
        write_script(&executor, script);

        let calls = call_log();
        let mut registry = HandlerRegistry::new();
        registry.register(PKG, Arc::new(pkg(&calls)));
        registry.register_kind("microsoft/steps:1", HandlerKind::MultiStep);
        let dispatcher = dispatcher_with(registry, &executor, dir.path());

        let queues = Arc::new(WorkQueueRegistry::new());
        let updates = queues.create("update").expect("update queue");
        let reports = queues.create("reporting").expect("reporting queue");
        let machine = WorkflowStateMachine::new(StateMachineParts {
            dispatcher,
            executor: Arc::new(ExecutorRunner::new(&executor, RuntimeLog::disabled())),
            updates: QueueSender::new(Arc::clone(&queues), updates),
            reports: QueueSender::new(Arc::clone(&queues), reports),
            log: RuntimeLog::disabled(),
            downloads_folder: dir.path().join("downloads"),
            default_update_type: default_update_type.map(str::to_string),
            step_tables,
        });

        Self {
            dir,
            machine,
            queues,
            updates,
            reports,
            calls,
        }
    }

    fn send(&mut self, payload: Value) -> ProcessOutcome {
        self.machine.handle_payload(&payload.to_string())
    }

    /// Runs queued continuation items until the update queue is empty.
    fn drain(&mut self) -> Vec<ProcessOutcome> {
        let mut outcomes = Vec::new();
        while let Some(item) = self.queues.get_next_work(self.updates) {
            outcomes.push(self.machine.handle_item(&item));
        }
        outcomes
    }

    fn reports(&self) -> Vec<StateReport> {
        std::iter::from_fn(|| self.queues.get_next_work(self.reports))
            .map(|item| serde_json::from_str(&item.payload).expect("report json"))
            .collect()
    }

    fn reported_states(&self) -> Vec<UpdateState> {
        self.reports().into_iter().map(|report| report.state).collect()
    }

    fn calls(&self) -> Vec<String> {
        calls(&self.calls)
    }

    fn work_folder(&self, id: &str) -> PathBuf {
        self.dir.path().join("downloads").join(id)
    }
}

fn deploy(id: &str) -> Value {
    json!({"action": "ProcessDeployment", "id": id, "updateType": PKG})
}

fn plain(calls: &CallLog) -> ScriptedExtension {
    ScriptedExtension::new("pkg", calls)
}

#[test]
fn state_machine_module_runs_download_install_apply_through_continuations() {
    let mut harness = Harness::new(plain);

    let first = harness.send(deploy("wf-1"));
    assert_eq!(
        first,
        ProcessOutcome::Processed {
            state: UpdateState::DownloadSucceeded
        }
    );
    assert_eq!(harness.calls(), vec!["pkg:isInstalled", "pkg:download"]);
    assert_eq!(harness.queues.get_size(harness.updates), 1);

    let rest = harness.drain();
    assert_eq!(
        rest,
        vec![
            ProcessOutcome::Processed {
                state: UpdateState::InstallSucceeded
            },
            ProcessOutcome::Processed {
                state: UpdateState::Succeeded
            },
        ]
    );
    assert_eq!(
        harness.calls(),
        vec!["pkg:isInstalled", "pkg:download", "pkg:install", "pkg:apply"]
    );

    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::success(codes::APPLY_SUCCESS)
    );
    assert!(harness.machine.current().is_none());
    let done = harness.machine.last_completed().expect("retired");
    assert_eq!(done.id.as_str(), "wf-1");
    assert_eq!(done.state, UpdateState::Succeeded);
    assert!(harness.work_folder("wf-1").is_dir());

    let reports = harness.reports();
    assert_eq!(
        reports.iter().map(|r| r.state).collect::<Vec<_>>(),
        vec![UpdateState::DeploymentInProgress, UpdateState::Succeeded]
    );
    assert_eq!(
        reports[0].result,
        UpdateResult::success(codes::DEPLOYMENT_IN_PROGRESS_SUCCESS)
    );
    assert_eq!(reports[1].workflow_id.as_deref(), Some("wf-1"));
    assert_eq!(reports[1].action, Some(UpdateAction::ProcessDeployment));
}

#[test]
fn state_machine_module_repeat_of_finished_deployment_is_duplicate() {
    let mut harness = Harness::new(plain);
    harness.send(deploy("wf-1"));
    harness.drain();
    harness.reports();
    let before = harness.calls().len();

    assert_eq!(harness.send(deploy("wf-1")), ProcessOutcome::Duplicate);
    assert!(harness.drain().is_empty());
    assert_eq!(harness.calls().len(), before);
    assert!(harness.reports().is_empty());
}

#[test]
fn state_machine_module_new_retry_token_reruns_and_same_token_is_duplicate() {
    let mut harness = Harness::new(plain);
    harness.send(deploy("wf-1"));
    harness.drain();

    let mut retry = deploy("wf-1");
    retry["retryToken"] = json!("t-1");
    assert_eq!(
        harness.send(retry.clone()),
        ProcessOutcome::Processed {
            state: UpdateState::DownloadSucceeded
        }
    );
    harness.drain();
    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    assert_eq!(
        harness
            .calls()
            .iter()
            .filter(|call| *call == "pkg:download")
            .count(),
        2
    );

    // Duplicate detection runs before the retry check.
    assert_eq!(harness.send(retry), ProcessOutcome::Duplicate);
}

#[test]
fn state_machine_module_same_token_while_running_is_not_applicable() {
    let mut harness = Harness::new(plain);
    let mut request = deploy("wf-1");
    request["retryToken"] = json!("t-1");
    harness.send(request.clone());

    assert_eq!(harness.send(request), ProcessOutcome::RetryNotApplicable);
    assert_eq!(harness.send(deploy("wf-1")), ProcessOutcome::AlreadyInProgress);

    harness.drain();
    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    assert_eq!(
        harness.calls(),
        vec!["pkg:isInstalled", "pkg:download", "pkg:install", "pkg:apply"]
    );
}

#[test]
fn state_machine_module_cancel_between_steps_stops_the_workflow() {
    let mut harness = Harness::new(plain);
    harness.send(deploy("wf-1"));

    assert_eq!(
        harness.send(json!({"action": "Cancel"})),
        ProcessOutcome::Processed {
            state: UpdateState::Idle
        }
    );
    assert_eq!(harness.drain(), vec![ProcessOutcome::StaleContinuation]);
    assert_eq!(
        harness.calls(),
        vec!["pkg:isInstalled", "pkg:download", "pkg:cancel"]
    );
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::success(codes::CANCEL_SUCCESS)
    );
    assert_eq!(
        harness.reported_states(),
        vec![UpdateState::DeploymentInProgress, UpdateState::Idle]
    );

    // Already idle: a second cancel changes nothing.
    assert_eq!(
        harness.send(json!({"action": "Cancel"})),
        ProcessOutcome::Duplicate
    );
}

#[test]
fn state_machine_module_cancel_when_idle_is_duplicate() {
    let mut harness = Harness::new(plain);
    assert_eq!(
        harness.send(json!({"action": "Cancel", "id": "wf-1"})),
        ProcessOutcome::Duplicate
    );
    assert!(harness.calls().is_empty());
    assert!(harness.reports().is_empty());
}

#[test]
fn state_machine_module_new_deployment_supersedes_running_one() {
    let mut harness = Harness::new(plain);
    harness.send(deploy("wf-1"));
    harness.send(deploy("wf-2"));
    assert_eq!(
        harness.calls(),
        vec![
            "pkg:isInstalled",
            "pkg:download",
            "pkg:cancel",
            "pkg:isInstalled",
            "pkg:download"
        ]
    );

    let outcomes = harness.drain();
    assert_eq!(outcomes[0], ProcessOutcome::StaleContinuation);
    assert_eq!(
        outcomes.last(),
        Some(&ProcessOutcome::Processed {
            state: UpdateState::Succeeded
        })
    );
    let done = harness.machine.last_completed().expect("retired");
    assert_eq!(done.id.as_str(), "wf-2");
    assert_eq!(
        harness
            .calls()
            .iter()
            .filter(|call| *call == "pkg:apply")
            .count(),
        1
    );

    let reports = harness.reports();
    let trail = reports
        .iter()
        .map(|r| (r.workflow_id.clone().unwrap_or_default(), r.state))
        .collect::<Vec<_>>();
    assert_eq!(
        trail,
        vec![
            ("wf-1".to_string(), UpdateState::DeploymentInProgress),
            ("wf-1".to_string(), UpdateState::Failed),
            ("wf-2".to_string(), UpdateState::DeploymentInProgress),
            ("wf-2".to_string(), UpdateState::Succeeded),
        ]
    );
    assert_eq!(
        reports[1].result,
        UpdateResult::new(codes::FAILURE_CANCELLED, erc::WORKFLOW_REPLACED)
    );
}

#[test]
fn state_machine_module_new_token_while_running_cancels_previous_attempt() {
    let mut harness = Harness::new(plain);
    let mut first = deploy("wf-1");
    first["retryToken"] = json!("t-1");
    harness.send(first);

    let mut retry = deploy("wf-1");
    retry["retryToken"] = json!("t-2");
    assert_eq!(
        harness.send(retry),
        ProcessOutcome::Processed {
            state: UpdateState::DownloadSucceeded
        }
    );
    assert_eq!(harness.drain()[0], ProcessOutcome::StaleContinuation);
    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    assert_eq!(
        harness.calls(),
        vec![
            "pkg:isInstalled",
            "pkg:download",
            "pkg:cancel",
            "pkg:isInstalled",
            "pkg:download",
            "pkg:install",
            "pkg:apply"
        ]
    );
    assert_eq!(
        harness.reported_states(),
        vec![
            UpdateState::DeploymentInProgress,
            UpdateState::Failed,
            UpdateState::DeploymentInProgress,
            UpdateState::Succeeded
        ]
    );
}

#[test]
fn state_machine_module_external_items_cannot_claim_pending_step() {
    let mut harness = Harness::new(plain);
    harness.send(deploy("wf-1"));
    assert_eq!(harness.queues.get_size(harness.updates), 1);

    assert_eq!(
        harness.send(json!({
            "action": "ProcessDeployment",
            "id": "wf-1",
            "continuation": {"step": "Install"}
        })),
        ProcessOutcome::Invalid
    );
    // Shaped like the agent's own item, but it arrived from outside.
    assert_eq!(
        harness.send(json!({
            "action": "ProcessDeployment",
            "id": "wf-1",
            "step": "Install"
        })),
        ProcessOutcome::AlreadyInProgress
    );
    assert_eq!(harness.calls(), vec!["pkg:isInstalled", "pkg:download"]);

    harness.drain();
    assert_eq!(
        harness
            .calls()
            .iter()
            .filter(|call| *call == "pkg:install")
            .count(),
        1
    );
}

#[test]
fn state_machine_module_deployment_without_update_type_uses_default() {
    let mut harness =
        Harness::with_parts(plain, "#!/bin/sh\nexit 0\n", Some(PKG), StepTables::new());

    assert_eq!(
        harness.send(json!({"action": "ProcessDeployment", "id": "wf-1"})),
        ProcessOutcome::Processed {
            state: UpdateState::DownloadSucceeded
        }
    );
    assert_eq!(harness.calls(), vec!["pkg:isInstalled", "pkg:download"]);
    harness.drain();
    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    let done = harness.machine.last_completed().expect("retired");
    assert_eq!(done.id.as_str(), "wf-1");
}

#[test]
fn state_machine_module_update_type_with_own_step_table_stops_after_install() {
    let table = StepTable::deployment(&[DeploymentStep::Download, DeploymentStep::Install])
        .expect("table");
    let mut harness = Harness::with_parts(
        plain,
        "#!/bin/sh\nexit 0\n",
        None,
        StepTables::new().with_table(PKG, table),
    );
    harness.send(deploy("wf-1"));
    harness.drain();

    assert_eq!(
        harness.calls(),
        vec!["pkg:isInstalled", "pkg:download", "pkg:install"]
    );
    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::success(codes::INSTALL_SUCCESS)
    );
    assert_eq!(
        harness.reported_states(),
        vec![UpdateState::DeploymentInProgress, UpdateState::Succeeded]
    );
}

#[test]
fn state_machine_module_failed_step_ends_the_workflow() {
    let failure = UpdateResult::new(codes::FAILURE, erc::executor_exit(100));
    let mut harness =
        Harness::new(|calls| plain(calls).returning(HandlerMethod::Install, failure));
    harness.send(deploy("wf-1"));
    let outcomes = harness.drain();

    assert_eq!(
        outcomes,
        vec![ProcessOutcome::Processed {
            state: UpdateState::Failed
        }]
    );
    assert!(!harness.calls().contains(&"pkg:apply".to_string()));
    let reports = harness.reports();
    let last = reports.last().expect("report");
    assert_eq!(last.state, UpdateState::Failed);
    assert_eq!(last.result, failure);
    assert_eq!(harness.send(deploy("wf-1")), ProcessOutcome::Duplicate);
}

#[test]
fn state_machine_module_skips_deployment_already_installed() {
    let installed = UpdateResult::success(codes::IS_INSTALLED_INSTALLED);
    let mut harness =
        Harness::new(|calls| plain(calls).returning(HandlerMethod::IsInstalled, installed));

    assert_eq!(
        harness.send(deploy("wf-1")),
        ProcessOutcome::Processed {
            state: UpdateState::Succeeded
        }
    );
    assert!(harness.drain().is_empty());
    assert_eq!(harness.calls(), vec!["pkg:isInstalled"]);
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::success(codes::DOWNLOAD_SKIPPED_UPDATE_ALREADY_INSTALLED)
    );
}

#[test]
fn state_machine_module_rejects_malformed_and_incomplete_requests() {
    let mut harness = Harness::new(plain);
    assert_eq!(
        harness.machine.handle_payload("not json"),
        ProcessOutcome::Invalid
    );
    assert_eq!(
        harness.send(json!({"action": "Explode", "id": "wf-1"})),
        ProcessOutcome::Invalid
    );
    assert_eq!(
        harness.send(json!({"action": "ProcessDeployment", "id": "bad id"})),
        ProcessOutcome::Invalid
    );
    assert_eq!(
        harness.send(json!({"action": "ProcessDeployment"})),
        ProcessOutcome::Invalid
    );

    assert_eq!(
        harness.send(json!({"action": "ProcessDeployment", "id": "wf-1"})),
        ProcessOutcome::Processed {
            state: UpdateState::Failed
        }
    );
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::failure(erc::WORKFLOW_MISSING_UPDATE_TYPE)
    );
    assert!(harness.calls().is_empty());
}

#[test]
fn state_machine_module_unknown_update_type_fails_with_load_failure() {
    let mut harness = Harness::new(plain);
    harness.send(json!({
        "action": "ProcessDeployment",
        "id": "wf-1",
        "updateType": "vendor/firmware:3"
    }));

    assert_eq!(harness.machine.agent_state(), UpdateState::Failed);
    let result = harness.machine.agent_result();
    assert_eq!(result.result_code, codes::HANDLER_LOAD_FAILURE);
    assert_eq!(result.extended_result_code, erc::HANDLER_UNKNOWN_UPDATE_TYPE);
}

#[test]
fn state_machine_module_reboot_follows_apply_that_requires_it() {
    let dir_marker = "reboot.args";
    let mut harness = Harness::with_executor(
        |calls| {
            plain(calls).returning(
                HandlerMethod::Apply,
                UpdateResult::success(codes::APPLY_REQUIRED_REBOOT),
            )
        },
        &format!("#!/bin/sh\necho \"$@\" > \"$(dirname \"$0\")/{dir_marker}\"\n"),
    );
    harness.send(deploy("wf-1"));
    harness.drain();

    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::success(codes::REBOOT_SUCCESS)
    );
    let args = fs::read_to_string(harness.dir.path().join(dir_marker)).expect("executor args");
    assert!(args.contains("--update-type common --update-action reboot"));
    assert!(harness.work_folder("wf-1").join("reboot.target.json").is_file());
}

#[test]
fn state_machine_module_rollback_targets_last_deployment() {
    let mut harness = Harness::new(plain);
    harness.send(deploy("wf-1"));
    harness.drain();
    harness.reports();

    assert_eq!(
        harness.send(json!({"action": "Rollback"})),
        ProcessOutcome::Processed {
            state: UpdateState::Succeeded
        }
    );
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::success(codes::ROLLBACK_SUCCESS)
    );
    let reports = harness.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].action, Some(UpdateAction::Rollback));
    assert_eq!(reports[0].workflow_id.as_deref(), Some("wf-1"));

    assert_eq!(
        harness.send(json!({"action": "Rollback", "id": "wf-1"})),
        ProcessOutcome::Duplicate
    );
}

#[test]
fn state_machine_module_executor_failure_fails_rollback() {
    let mut harness = Harness::with_executor(plain, "#!/bin/sh\nexit 4\n");
    harness.send(json!({"action": "Rollback", "id": "wf-9"}));

    assert_eq!(harness.machine.agent_state(), UpdateState::Failed);
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::failure(erc::executor_exit(4))
    );
}

#[test]
fn state_machine_module_records_multi_step_children_in_reports() {
    let mut harness = Harness::new(plain);
    harness.send(json!({
        "action": "ProcessDeployment",
        "id": "wf-1",
        "updateType": "microsoft/steps:1",
        "steps": [{"updateType": PKG}, {"updateType": PKG}]
    }));
    harness.drain();

    assert_eq!(harness.machine.agent_state(), UpdateState::Succeeded);
    let reports = harness.reports();
    let last = reports.last().expect("final report");
    assert_eq!(last.children.len(), 2);
    assert!(last
        .children
        .iter()
        .all(|child| child.last_method == Some(HandlerMethod::Apply)));
    assert!(Path::new(&harness.work_folder("wf-1")).is_dir());
}

#[test]
fn state_machine_module_cancel_after_terminal_outcome_returns_to_idle() {
    let mut harness = Harness::new(plain);
    harness.send(deploy("wf-1"));
    harness.drain();
    harness.reports();

    assert_eq!(
        harness.send(json!({"action": "Cancel", "id": "wf-1"})),
        ProcessOutcome::Processed {
            state: UpdateState::Idle
        }
    );
    assert_eq!(
        harness.machine.agent_result(),
        UpdateResult::success(codes::IDLE_SUCCESS)
    );
    assert!(!harness.calls().contains(&"pkg:cancel".to_string()));
    let reports = harness.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, UpdateState::Idle);
    assert_eq!(reports[0].workflow_id, None);
}
