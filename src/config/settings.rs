use super::ConfigError;
use crate::executor::ExecutorRunner;
use crate::handlers::{HandlerKind, HandlerRegistry};
use crate::orchestration::{DeploymentStep, StepTable, StepTables};
use crate::runtime::worker_primitives::{WORKER_MAX_POLL_MS, WORKER_MIN_POLL_MS};
use crate::shared::{LogLevel, LogTarget, RuntimeLog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_FOLDER: &str = "/var/lib/updagent";
pub const DEFAULT_EXECUTOR_PATH: &str = "/usr/lib/updagent/upd-shell";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub workers: WorkerSettings,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default = "default_handlers")]
    pub handlers: BTreeMap<String, HandlerKind>,
    /// Update type for deployments whose notification names none.
    #[serde(default)]
    pub default_update_type: Option<String>,
    /// Deployment chains for update types that do not run the standard
    /// download, install, apply sequence.
    #[serde(default)]
    pub step_tables: BTreeMap<String, Vec<DeploymentStep>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_executor_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub log_folder: Option<PathBuf>,
    #[serde(default)]
    pub target_options: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogSettings {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    pub require_executor_exists: bool,
}

fn default_data_folder() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FOLDER)
}

fn default_executor_path() -> PathBuf {
    PathBuf::from(DEFAULT_EXECUTOR_PATH)
}

fn default_poll_interval_ms() -> u64 {
    crate::runtime::worker_primitives::WORKER_DEFAULT_POLL_MS
}

pub fn default_handlers() -> BTreeMap<String, HandlerKind> {
    [
        ("microsoft/apt:1", HandlerKind::Apt),
        ("microsoft/swupdate:2", HandlerKind::Swupdate),
        ("microsoft/script:1", HandlerKind::Script),
        ("microsoft/steps:1", HandlerKind::MultiStep),
        ("test/simulator:1", HandlerKind::Simulator),
    ]
    .into_iter()
    .map(|(update_type, kind)| (update_type.to_string(), kind))
    .collect()
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            path: default_executor_path(),
            log_folder: None,
            target_options: None,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_folder: default_data_folder(),
            executor: ExecutorSettings::default(),
            workers: WorkerSettings::default(),
            log: LogSettings::default(),
            handlers: default_handlers(),
            default_update_type: None,
            step_tables: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self, options: ValidationOptions) -> Result<(), ConfigError> {
        if self.data_folder.as_os_str().is_empty() {
            return Err(ConfigError::Settings(
                "`data_folder` must be non-empty".to_string(),
            ));
        }
        if !(WORKER_MIN_POLL_MS..=WORKER_MAX_POLL_MS).contains(&self.workers.poll_interval_ms) {
            return Err(ConfigError::Settings(format!(
                "`workers.poll_interval_ms` must be between {WORKER_MIN_POLL_MS} and {WORKER_MAX_POLL_MS}"
            )));
        }
        if self.executor.path.as_os_str().is_empty() {
            return Err(ConfigError::Settings(
                "`executor.path` must be non-empty".to_string(),
            ));
        }
        if options.require_executor_exists && !self.executor.path.is_file() {
            return Err(ConfigError::Settings(format!(
                "executor `{}` does not exist",
                self.executor.path.display()
            )));
        }
        if let Some(target_options) = &self.executor.target_options {
            if target_options.is_empty()
                || target_options.starts_with('-')
                || target_options.chars().any(char::is_control)
            {
                return Err(ConfigError::Settings(
                    "`executor.target_options` must be non-empty, must not start with '-' and must not contain control characters".to_string(),
                ));
            }
        }
        for update_type in self.handlers.keys() {
            if update_type.trim().is_empty() {
                return Err(ConfigError::Settings(
                    "`handlers` keys must be non-empty update types".to_string(),
                ));
            }
        }
        if let Some(update_type) = &self.default_update_type {
            if !self.handlers.contains_key(update_type) {
                return Err(ConfigError::Settings(format!(
                    "`default_update_type` `{update_type}` has no entry in `handlers`"
                )));
            }
        }
        self.step_tables()?;
        Ok(())
    }

    pub fn step_tables(&self) -> Result<StepTables, ConfigError> {
        self.step_tables
            .iter()
            .try_fold(StepTables::new(), |tables, (update_type, steps)| {
                if !self.handlers.contains_key(update_type) {
                    return Err(ConfigError::Settings(format!(
                        "`step_tables` entry `{update_type}` has no entry in `handlers`"
                    )));
                }
                let table = StepTable::deployment(steps).map_err(|reason| {
                    ConfigError::Settings(format!("`step_tables.{update_type}`: {reason}"))
                })?;
                Ok(tables.with_table(update_type, table))
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.workers.poll_interval_ms)
    }

    pub fn runtime_log(&self) -> RuntimeLog {
        let target = match &self.log.file {
            Some(path) => LogTarget::File(path.clone()),
            None => LogTarget::Stderr,
        };
        RuntimeLog::new(target, self.log.level)
    }

    pub fn executor_runner(&self, log: RuntimeLog) -> ExecutorRunner {
        ExecutorRunner::new(&self.executor.path, log)
            .with_target_options(self.executor.target_options.clone())
            .with_log_folder(self.executor.log_folder.clone())
    }

    pub fn handler_registry(&self) -> HandlerRegistry {
        HandlerRegistry::from_kinds(&self.handlers)
    }

    pub fn downloads_folder(&self) -> PathBuf {
        self.data_folder.join("downloads")
    }
}
