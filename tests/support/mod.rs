#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use updagent::executor::ExecutorRunner;
use updagent::handlers::{
    ContentHandler, ContractInfo, HandlerDispatcher, HandlerEnv, HandlerExtension, HandlerMethod,
    HandlerRegistry, WorkflowData,
};
use updagent::shared::{RuntimeLog, UpdateResult};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().expect("call log").clone()
}

pub fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

/// Handler extension whose handlers answer from a per-method table and
/// record every call as `<label>:<method>`.
#[derive(Clone)]
pub struct ScriptedExtension {
    label: String,
    calls: CallLog,
    results: HashMap<HandlerMethod, UpdateResult>,
    panic_on: Option<HandlerMethod>,
    contract: ContractInfo,
    create_error: Option<String>,
    pub created: Arc<AtomicUsize>,
}

impl ScriptedExtension {
    pub fn new(label: &str, calls: &CallLog) -> Self {
        Self {
            label: label.to_string(),
            calls: Arc::clone(calls),
            results: HashMap::new(),
            panic_on: None,
            contract: ContractInfo::CURRENT,
            create_error: None,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn returning(mut self, method: HandlerMethod, result: UpdateResult) -> Self {
        self.results.insert(method, result);
        self
    }

    pub fn panicking_on(mut self, method: HandlerMethod) -> Self {
        self.panic_on = Some(method);
        self
    }

    pub fn with_contract(mut self, major: u32, minor: u32) -> Self {
        self.contract = ContractInfo { major, minor };
        self
    }

    pub fn failing_create(mut self, reason: &str) -> Self {
        self.create_error = Some(reason.to_string());
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl HandlerExtension for ScriptedExtension {
    fn contract_info(&self) -> ContractInfo {
        self.contract
    }

    fn create_handler(&self, _env: &HandlerEnv) -> Result<Arc<dyn ContentHandler>, String> {
        if let Some(reason) = &self.create_error {
            return Err(reason.clone());
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedHandler {
            label: self.label.clone(),
            calls: Arc::clone(&self.calls),
            results: self.results.clone(),
            panic_on: self.panic_on,
        }))
    }
}

struct ScriptedHandler {
    label: String,
    calls: CallLog,
    results: HashMap<HandlerMethod, UpdateResult>,
    panic_on: Option<HandlerMethod>,
}

impl ScriptedHandler {
    fn answer(&self, method: HandlerMethod) -> UpdateResult {
        self.calls
            .lock()
            .expect("call log")
            .push(format!("{}:{method}", self.label));
        if self.panic_on == Some(method) {
            panic!("scripted fault in {method}");
        }
        self.results
            .get(&method)
            .copied()
            .unwrap_or(UpdateResult::success(method.success_code()))
    }
}

impl ContentHandler for ScriptedHandler {
    fn download(&self, _data: &WorkflowData) -> UpdateResult {
        self.answer(HandlerMethod::Download)
    }

    fn install(&self, _data: &WorkflowData) -> UpdateResult {
        self.answer(HandlerMethod::Install)
    }

    fn apply(&self, _data: &WorkflowData) -> UpdateResult {
        self.answer(HandlerMethod::Apply)
    }

    fn cancel(&self, _data: &WorkflowData) -> UpdateResult {
        self.answer(HandlerMethod::Cancel)
    }

    fn is_installed(&self, _data: &WorkflowData) -> UpdateResult {
        self.answer(HandlerMethod::IsInstalled)
    }
}

pub fn dispatcher_with(
    registry: HandlerRegistry,
    executor_binary: &Path,
    data_folder: &Path,
) -> Arc<HandlerDispatcher> {
    HandlerDispatcher::new(
        registry,
        RuntimeLog::disabled(),
        Arc::new(ExecutorRunner::new(executor_binary, RuntimeLog::disabled())),
        data_folder.to_path_buf(),
    )
}

pub fn dispatcher(registry: HandlerRegistry, data_folder: &Path) -> Arc<HandlerDispatcher> {
    dispatcher_with(registry, &data_folder.join("no-executor"), data_folder)
}
