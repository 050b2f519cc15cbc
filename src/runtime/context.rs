use super::{
    start_worker, RuntimeError, WorkerConfig, WorkerHandle, WorkerHealth, WorkerRegistry,
    WorkerStats,
};
use crate::config::Settings;
use crate::executor::ExecutorRunner;
use crate::handlers::{HandlerDispatcher, HandlerRegistry};
use crate::orchestration::{
    ReportSink, ReportingProcessor, StateMachineParts, StepTables, WorkflowStateMachine,
};
use crate::queue::{QueueSender, WorkQueueHandle, WorkQueueRegistry};
use crate::shared::RuntimeLog;
use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const UPDATE_QUEUE_NAME: &str = "update";
pub const REPORTING_QUEUE_NAME: &str = "reporting";

const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct RunningWorkers {
    update: WorkerHandle,
    reporting: WorkerHandle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub update: WorkerStats,
    pub reporting: WorkerStats,
    pub discarded_updates: usize,
    pub discarded_reports: usize,
}

/// Owns the agent's queues, workers and handler cache for one run:
/// `init`, then `start`, then `shutdown`.
#[derive(Debug)]
pub struct AgentContext {
    settings: Settings,
    log: RuntimeLog,
    queues: Arc<WorkQueueRegistry>,
    update_queue: WorkQueueHandle,
    reporting_queue: WorkQueueHandle,
    dispatcher: Arc<HandlerDispatcher>,
    executor: Arc<ExecutorRunner>,
    step_tables: StepTables,
    health: Arc<Mutex<WorkerRegistry>>,
    workers: Option<RunningWorkers>,
}

impl AgentContext {
    pub fn init(settings: Settings) -> Result<Self, RuntimeError> {
        let log = settings.runtime_log();
        let registry = settings.handler_registry();
        Self::init_with(settings, registry, log)
    }

    pub fn init_with(
        settings: Settings,
        handlers: HandlerRegistry,
        log: RuntimeLog,
    ) -> Result<Self, RuntimeError> {
        let step_tables = settings.step_tables()?;
        let downloads = settings.downloads_folder();
        fs::create_dir_all(&downloads).map_err(|source| RuntimeError::CreateDir {
            path: downloads.display().to_string(),
            source,
        })?;

        let queues = Arc::new(WorkQueueRegistry::new());
        let update_queue = queues.create(UPDATE_QUEUE_NAME)?;
        let reporting_queue = queues.create(REPORTING_QUEUE_NAME)?;
        let executor = Arc::new(settings.executor_runner(log.clone()));
        let dispatcher = HandlerDispatcher::new(
            handlers,
            log.clone(),
            Arc::clone(&executor),
            settings.data_folder.clone(),
        );

        log.info(
            "agent.initialized",
            &format!(
                "data_folder={} handlers={}",
                settings.data_folder.display(),
                dispatcher.registry().len()
            ),
        );
        Ok(Self {
            settings,
            log,
            queues,
            update_queue,
            reporting_queue,
            dispatcher,
            executor,
            step_tables,
            health: Arc::new(Mutex::new(WorkerRegistry::default())),
            workers: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn log(&self) -> &RuntimeLog {
        &self.log
    }

    pub fn dispatcher(&self) -> &Arc<HandlerDispatcher> {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Starts the reporting worker, then the update worker.
    pub fn start(&mut self, sink: Box<dyn ReportSink>) -> Result<(), RuntimeError> {
        if self.workers.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }

        let reporting = start_worker(
            &self.queues,
            self.reporting_queue,
            self.worker_config(REPORTING_QUEUE_NAME),
            ReportingProcessor::new(sink, self.log.clone()),
        )?;

        let machine = WorkflowStateMachine::new(StateMachineParts {
            dispatcher: Arc::clone(&self.dispatcher),
            executor: Arc::clone(&self.executor),
            updates: self.notifier(),
            reports: QueueSender::new(Arc::clone(&self.queues), self.reporting_queue),
            log: self.log.clone(),
            downloads_folder: self.settings.downloads_folder(),
            default_update_type: self.settings.default_update_type.clone(),
            step_tables: self.step_tables.clone(),
        });
        // A failed update start drops `reporting`, which stops and joins it.
        let update = start_worker(
            &self.queues,
            self.update_queue,
            self.worker_config(UPDATE_QUEUE_NAME),
            machine,
        )?;

        self.workers = Some(RunningWorkers { update, reporting });
        self.log.info("agent.started", "update and reporting workers running");
        Ok(())
    }

    fn worker_config(&self, name: &str) -> WorkerConfig {
        WorkerConfig::new(name)
            .with_poll_interval(self.settings.poll_interval())
            .with_log(self.log.clone())
            .with_health(Arc::clone(&self.health))
    }

    /// Producer handle for the transport callback: enqueue only.
    pub fn notifier(&self) -> QueueSender {
        QueueSender::new(Arc::clone(&self.queues), self.update_queue)
    }

    pub fn enqueue_notification(&self, payload: &str) -> bool {
        self.queues.enqueue_work(self.update_queue, payload)
    }

    pub fn update_queue_size(&self) -> usize {
        self.queues.get_size(self.update_queue)
    }

    pub fn reporting_queue_size(&self) -> usize {
        self.queues.get_size(self.reporting_queue)
    }

    pub fn worker_states(&self) -> BTreeMap<String, WorkerHealth> {
        self.health
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .all()
            .clone()
    }

    /// Waits until both queues are drained and neither worker holds an item.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = match &self.workers {
                // Update first: once it is idle it produces no new reports.
                Some(workers) => workers.update.is_idle() && workers.reporting.is_idle(),
                None => self.update_queue_size() == 0 && self.reporting_queue_size() == 0,
            };
            if idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    /// Signals both workers, joins the update worker and then the reporting
    /// worker, and only then destroys the queues. Items still queued are
    /// discarded and counted.
    pub fn shutdown(mut self) -> Result<ShutdownSummary, RuntimeError> {
        let mut summary = ShutdownSummary::default();
        if let Some(RunningWorkers { update, reporting }) = self.workers.take() {
            update.signal_stop();
            reporting.signal_stop();
            let update_stats = update.join();
            let reporting_stats = reporting.join();
            summary.update = update_stats?;
            summary.reporting = reporting_stats?;
        }

        summary.discarded_updates = self.queues.destroy(self.update_queue)?.discarded;
        summary.discarded_reports = self.queues.destroy(self.reporting_queue)?.discarded;
        self.log.info(
            "agent.stopped",
            &format!(
                "processed={} reported={} discarded_updates={} discarded_reports={}",
                summary.update.processed,
                summary.reporting.processed,
                summary.discarded_updates,
                summary.discarded_reports
            ),
        );
        Ok(summary)
    }
}
