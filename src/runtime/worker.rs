use super::{sleep_with_stop, RuntimeError, WorkerEvent, WorkerRegistry};
use crate::queue::{QueueError, WorkItem, WorkQueueHandle, WorkQueueRegistry};
use crate::shared::{now_millis, RuntimeLog};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Per-item callback run on the worker thread.
pub trait WorkProcessor: Send + 'static {
    fn process(&mut self, item: WorkItem);
}

impl<F> WorkProcessor for F
where
    F: FnMut(WorkItem) + Send + 'static,
{
    fn process(&mut self, item: WorkItem) {
        self(item)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub poll_interval: Duration,
    pub log: RuntimeLog,
    pub health: Arc<Mutex<WorkerRegistry>>,
}

impl WorkerConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            poll_interval: Duration::from_millis(super::worker_primitives::WORKER_DEFAULT_POLL_MS),
            log: RuntimeLog::disabled(),
            health: Arc::new(Mutex::new(WorkerRegistry::default())),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_log(mut self, log: RuntimeLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_health(mut self, health: Arc<Mutex<WorkerRegistry>>) -> Self {
        self.health = health;
        self
    }

    fn emit(&self, event: WorkerEvent) {
        let mut health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        health.apply(&self.log, event);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub faults: u64,
}

/// A running worker bound to one queue.
///
/// Dropping the handle stops and joins the thread.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    queue: WorkQueueHandle,
    registry: Arc<WorkQueueRegistry>,
    stop: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    thread: Option<JoinHandle<WorkerStats>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> WorkQueueHandle {
        self.queue
    }

    /// Requests a stop; the thread exits after the item it is processing.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// True when the worker holds no item and its queue is empty.
    pub fn is_idle(&self) -> bool {
        !self.is_busy() && self.registry.get_size(self.queue) == 0
    }

    /// Stops the worker, waits for the thread and releases the queue.
    pub fn join(mut self) -> Result<WorkerStats, RuntimeError> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<WorkerStats, RuntimeError> {
        self.signal_stop();
        let Some(thread) = self.thread.take() else {
            return Ok(WorkerStats::default());
        };
        let joined = thread.join();
        self.registry.detach_worker(self.queue);
        joined.map_err(|_| RuntimeError::WorkerPanicked {
            name: self.name.clone(),
        })
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.join_inner();
    }
}

/// Attaches a worker thread to `queue`. A queue serves at most one worker.
pub fn start_worker<P: WorkProcessor>(
    registry: &Arc<WorkQueueRegistry>,
    queue: WorkQueueHandle,
    config: WorkerConfig,
    processor: P,
) -> Result<WorkerHandle, RuntimeError> {
    registry.attach_worker(queue).map_err(|err| match err {
        QueueError::WorkerAlreadyAttached { name } => RuntimeError::WorkerAlreadyActive { name },
        other => RuntimeError::Queue(other),
    })?;

    let stop = Arc::new(AtomicBool::new(false));
    let busy = Arc::new(AtomicBool::new(false));
    let name = config.name.clone();
    config.health.lock().unwrap_or_else(|p| p.into_inner()).register(&name);

    let spawned = thread::Builder::new()
        .name(format!("updagent-{name}"))
        .spawn({
            let registry = Arc::clone(registry);
            let stop = Arc::clone(&stop);
            let busy = Arc::clone(&busy);
            move || run_worker_loop(&registry, queue, &config, processor, &stop, &busy)
        });
    let thread = match spawned {
        Ok(thread) => thread,
        Err(source) => {
            registry.detach_worker(queue);
            return Err(RuntimeError::SpawnWorker { name, source });
        }
    };

    Ok(WorkerHandle {
        name,
        queue,
        registry: Arc::clone(registry),
        stop,
        busy,
        thread: Some(thread),
    })
}

fn run_worker_loop<P: WorkProcessor>(
    registry: &WorkQueueRegistry,
    queue: WorkQueueHandle,
    config: &WorkerConfig,
    mut processor: P,
    stop: &AtomicBool,
    busy: &AtomicBool,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    config.emit(WorkerEvent::Started {
        worker_id: config.name.clone(),
        at: now_millis(),
    });

    while !stop.load(Ordering::Acquire) {
        // Busy is raised before the dequeue so an observer never sees an
        // empty queue and an idle worker while an item is in flight.
        busy.store(true, Ordering::Release);
        let Some(item) = registry.get_next_work(queue) else {
            busy.store(false, Ordering::Release);
            if !sleep_with_stop(stop, config.poll_interval) {
                break;
            }
            continue;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(item)));
        busy.store(false, Ordering::Release);
        match outcome {
            Ok(()) => {
                stats.processed += 1;
                config.emit(WorkerEvent::Processed {
                    worker_id: config.name.clone(),
                    at: now_millis(),
                });
            }
            Err(payload) => {
                stats.faults += 1;
                config.emit(WorkerEvent::Error {
                    worker_id: config.name.clone(),
                    at: now_millis(),
                    message: format!("processor panicked: {}", panic_message(payload.as_ref())),
                    fatal: false,
                });
            }
        }
    }

    config.emit(WorkerEvent::Stopped {
        worker_id: config.name.clone(),
        at: now_millis(),
    });
    stats
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
