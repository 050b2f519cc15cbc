use super::target_data::sha256_hex;
use super::{AllowedUpdateType, ExecutorAction, ExecutorError, ExecutorInvocation};
use crate::shared::{RuntimeLog, UpdateResult};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns the privileged executor for one action and blocks until it exits.
///
/// The child is never killed: a cancel requested meanwhile takes effect once
/// the current action returns.
#[derive(Debug, Clone)]
pub struct ExecutorRunner {
    binary: PathBuf,
    log: RuntimeLog,
    target_options: Option<String>,
    log_folder: Option<PathBuf>,
}

impl ExecutorRunner {
    pub fn new(binary: impl Into<PathBuf>, log: RuntimeLog) -> Self {
        Self {
            binary: binary.into(),
            log,
            target_options: None,
            log_folder: None,
        }
    }

    pub fn with_target_options(mut self, options: Option<String>) -> Self {
        self.target_options = options;
        self
    }

    pub fn with_log_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.log_folder = folder;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Builds the invocation with the configured options and log folder.
    pub fn invocation(
        &self,
        update_type: AllowedUpdateType,
        action: ExecutorAction,
        target_data: &Path,
    ) -> Result<ExecutorInvocation, ExecutorError> {
        let mut invocation = ExecutorInvocation::new(update_type, action, target_data)?;
        if let Some(options) = &self.target_options {
            invocation = invocation.with_target_options(options)?;
        }
        if let Some(folder) = &self.log_folder {
            invocation = invocation.with_target_log_folder(folder)?;
        }
        Ok(invocation)
    }

    pub fn run(&self, invocation: &ExecutorInvocation) -> Result<ExecutorOutput, ExecutorError> {
        let binary = self.binary.display().to_string();
        let digest = std::fs::read(invocation.target_data())
            .map(|bytes| sha256_hex(&bytes))
            .unwrap_or_else(|_| "unreadable".to_string());
        self.log.info(
            "executor.invoke",
            &format!(
                "{} {} target_data_sha256={}",
                binary,
                invocation.command_form(),
                digest
            ),
        );

        let mut child = Command::new(&self.binary)
            .args(invocation.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                self.log
                    .error("executor.spawn", &format!("{binary}: {source}"));
                ExecutorError::Spawn {
                    binary: binary.clone(),
                    source,
                }
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr_reader = thread::spawn(move || read_pipe(stderr));

        let status = child.wait().map_err(|source| ExecutorError::Wait {
            binary: binary.clone(),
            source,
        });
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        self.log_child_output("stdout", &stdout);
        self.log_child_output("stderr", &stderr);
        let status = status?;

        self.log.info(
            "executor.exit",
            &format!(
                "{} {} status={}",
                invocation.update_type(),
                invocation.update_action(),
                status
            ),
        );
        classify_status(status, stdout, stderr)
    }

    /// Checks raw type and action strings against the allow-lists before
    /// anything is spawned.
    pub fn invoke(
        &self,
        update_type: &str,
        update_action: &str,
        target_data: &Path,
    ) -> Result<ExecutorOutput, ExecutorError> {
        let invocation = AllowedUpdateType::parse(update_type)
            .and_then(|kind| Ok((kind, ExecutorAction::parse(update_action)?)))
            .and_then(|(kind, action)| self.invocation(kind, action, target_data))
            .inspect_err(|err| {
                self.log.warn("executor.rejected", &err.to_string());
            })?;
        self.run(&invocation)
    }

    /// Validates, runs and maps the outcome to `success_code` or a failure
    /// carrying the executor's extended code.
    pub fn run_for_result(
        &self,
        update_type: AllowedUpdateType,
        action: ExecutorAction,
        target_data: &Path,
        success_code: i32,
    ) -> UpdateResult {
        let outcome = self
            .invocation(update_type, action, target_data)
            .and_then(|invocation| self.run(&invocation));
        match outcome {
            Ok(_) => UpdateResult::success(success_code),
            Err(err) => {
                self.log.warn("executor.failed", &err.to_string());
                err.to_update_result()
            }
        }
    }

    fn log_child_output(&self, stream: &str, output: &str) {
        for line in output.lines().filter(|line| !line.trim().is_empty()) {
            self.log
                .debug("executor.child", &format!("{stream}: {line}"));
        }
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(pipe) = pipe {
        let _ = BufReader::new(pipe).read_to_string(&mut buf);
    }
    buf
}

fn classify_status(
    status: ExitStatus,
    stdout: String,
    stderr: String,
) -> Result<ExecutorOutput, ExecutorError> {
    if let Some(exit_code) = status.code() {
        if exit_code == 0 {
            return Ok(ExecutorOutput {
                exit_code,
                stdout,
                stderr,
            });
        }
        return Err(ExecutorError::NonZeroExit { exit_code, stderr });
    }
    Err(ExecutorError::Signaled {
        signal: termination_signal(status),
    })
}

#[cfg(unix)]
fn termination_signal(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(-1)
}

#[cfg(not(unix))]
fn termination_signal(_status: ExitStatus) -> i32 {
    -1
}
