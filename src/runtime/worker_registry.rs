use super::WorkerEvent;
use crate::shared::{LogLevel, RuntimeLog};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Stopped,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub state: WorkerState,
    pub last_activity: Option<i64>,
    pub processed: u64,
    pub faults: u64,
    pub last_error: Option<String>,
}

/// Health of every worker the agent has started, keyed by worker id.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, WorkerHealth>,
}

impl WorkerRegistry {
    pub fn register(&mut self, worker_id: &str) {
        self.workers.entry(worker_id.to_string()).or_default();
    }

    pub fn state(&self, worker_id: &str) -> Option<WorkerState> {
        self.workers.get(worker_id).map(|health| health.state)
    }

    pub fn health(&self, worker_id: &str) -> Option<&WorkerHealth> {
        self.workers.get(worker_id)
    }

    pub fn all(&self) -> &BTreeMap<String, WorkerHealth> {
        &self.workers
    }

    pub fn apply(&mut self, log: &RuntimeLog, event: WorkerEvent) {
        apply_worker_event(&mut self.workers, log, event);
    }
}

pub(crate) fn apply_worker_event(
    workers: &mut BTreeMap<String, WorkerHealth>,
    log: &RuntimeLog,
    event: WorkerEvent,
) {
    match event {
        WorkerEvent::Started { worker_id, at } => {
            let entry = workers.entry(worker_id.clone()).or_default();
            entry.state = WorkerState::Running;
            entry.last_activity = Some(at);
            log.info("worker.started", &worker_id);
        }
        WorkerEvent::Processed { worker_id, at } => {
            let entry = workers.entry(worker_id).or_default();
            if entry.state != WorkerState::Error {
                entry.state = WorkerState::Running;
            }
            entry.processed += 1;
            entry.last_activity = Some(at);
        }
        WorkerEvent::Error {
            worker_id,
            at,
            message,
            fatal,
        } => {
            let entry = workers.entry(worker_id.clone()).or_default();
            if fatal {
                entry.state = WorkerState::Error;
            }
            entry.faults += 1;
            entry.last_activity = Some(at);
            entry.last_error = Some(message.clone());
            log.append(
                if fatal {
                    LogLevel::Error
                } else {
                    LogLevel::Warn
                },
                "worker.error",
                &format!("{worker_id}: {message}"),
            );
        }
        WorkerEvent::Stopped { worker_id, at } => {
            let entry = workers.entry(worker_id.clone()).or_default();
            if entry.state != WorkerState::Error {
                entry.state = WorkerState::Stopped;
            }
            entry.last_activity = Some(at);
            log.info("worker.stopped", &worker_id);
        }
    }
}
