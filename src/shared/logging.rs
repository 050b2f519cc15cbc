use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for LogLevel {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
    Disabled,
}

/// JSON-lines log shared by the workers, the dispatcher and the executor.
///
/// Writes never fail the caller; a line that cannot be written is dropped.
#[derive(Debug, Clone)]
pub struct RuntimeLog {
    target: LogTarget,
    level: LogLevel,
    write_lock: Arc<Mutex<()>>,
}

impl RuntimeLog {
    pub fn new(target: LogTarget, level: LogLevel) -> Self {
        Self {
            target,
            level,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn to_file(path: impl Into<PathBuf>, level: LogLevel) -> Self {
        Self::new(LogTarget::File(path.into()), level)
    }

    pub fn disabled() -> Self {
        Self::new(LogTarget::Disabled, LogLevel::Error)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.target != LogTarget::Disabled && level >= self.level
    }

    pub fn debug(&self, event: &str, message: &str) {
        self.append(LogLevel::Debug, event, message);
    }

    pub fn info(&self, event: &str, message: &str) {
        self.append(LogLevel::Info, event, message);
    }

    pub fn warn(&self, event: &str, message: &str) {
        self.append(LogLevel::Warn, event, message);
    }

    pub fn error(&self, event: &str, message: &str) {
        self.append(LogLevel::Error, event, message);
    }

    pub fn append(&self, level: LogLevel, event: &str, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let payload = serde_json::json!({
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "level": level.as_str(),
            "event": event,
            "message": message,
        });
        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        match &self.target {
            LogTarget::File(path) => append_line(path, &line),
            LogTarget::Stderr => {
                let _ = writeln!(std::io::stderr().lock(), "{line}");
            }
            LogTarget::Disabled => {}
        }
    }
}

fn append_line(path: &Path, line: &str) {
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}
