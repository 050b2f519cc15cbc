use super::{QueueError, WorkItem, WorkQueue};
use std::sync::{Arc, Mutex, MutexGuard};

/// Opaque reference to a queue owned by a [`WorkQueueRegistry`].
///
/// A handle stays cheap to copy; once its queue is destroyed every use of it
/// fails or returns the empty value instead of touching freed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkQueueHandle {
    index: u32,
    generation: u32,
}

impl WorkQueueHandle {
    /// Generation 0 is never issued, so this never resolves.
    pub const NULL: WorkQueueHandle = WorkQueueHandle {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_null(&self) -> bool {
        self.generation == 0
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    queue: Option<Arc<WorkQueue>>,
    worker_attached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyedQueue {
    pub name: String,
    pub discarded: usize,
}

#[derive(Debug, Default)]
pub struct WorkQueueRegistry {
    slots: Mutex<Vec<Slot>>,
}

impl WorkQueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<MutexGuard<'_, Vec<Slot>>, QueueError> {
        self.slots
            .lock()
            .map_err(|err| QueueError::LockPoisoned(err.to_string()))
    }

    pub fn create(&self, name: &str) -> Result<WorkQueueHandle, QueueError> {
        let mut slots = self.slots()?;
        let queue = Arc::new(WorkQueue::new(name));

        if let Some((index, slot)) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.queue.is_none())
        {
            slot.generation = next_generation(slot.generation);
            slot.queue = Some(queue);
            slot.worker_attached = false;
            return Ok(WorkQueueHandle {
                index: index as u32,
                generation: slot.generation,
            });
        }

        let index = u32::try_from(slots.len()).map_err(|_| QueueError::AllocationFailed {
            name: name.to_string(),
        })?;
        slots
            .try_reserve(1)
            .map_err(|_| QueueError::AllocationFailed {
                name: name.to_string(),
            })?;
        slots.push(Slot {
            generation: 1,
            queue: Some(queue),
            worker_attached: false,
        });
        Ok(WorkQueueHandle {
            index,
            generation: 1,
        })
    }

    /// Discards the pending items and invalidates `handle`.
    ///
    /// Refused while a worker is attached: the worker must be stopped and
    /// joined first.
    pub fn destroy(&self, handle: WorkQueueHandle) -> Result<DestroyedQueue, QueueError> {
        let mut slots = self.slots()?;
        let slot = live_slot_mut(&mut slots, handle).ok_or(QueueError::InvalidHandle)?;
        if slot.worker_attached {
            let name = slot
                .queue
                .as_ref()
                .map(|queue| queue.name().to_string())
                .unwrap_or_default();
            return Err(QueueError::WorkerActive { name });
        }
        let queue = slot.queue.take().ok_or(QueueError::InvalidHandle)?;
        Ok(DestroyedQueue {
            name: queue.name().to_string(),
            discarded: queue.clear(),
        })
    }

    pub fn queue(&self, handle: WorkQueueHandle) -> Option<Arc<WorkQueue>> {
        let slots = self.slots().ok()?;
        live_slot(&slots, handle).and_then(|slot| slot.queue.clone())
    }

    /// Appends a copy of `payload`. False for a null or destroyed handle and
    /// on allocation failure; the queue is left unchanged in both cases.
    pub fn enqueue_work(&self, handle: WorkQueueHandle, payload: &str) -> bool {
        match self.queue(handle) {
            Some(queue) => queue.enqueue(payload).is_ok(),
            None => false,
        }
    }

    /// Like [`Self::enqueue_work`] for items the agent schedules for itself.
    pub(crate) fn enqueue_internal(&self, handle: WorkQueueHandle, payload: &str) -> bool {
        match self.queue(handle) {
            Some(queue) => queue.enqueue_internal(payload).is_ok(),
            None => false,
        }
    }

    pub fn get_next_work(&self, handle: WorkQueueHandle) -> Option<WorkItem> {
        self.queue(handle)?.dequeue().ok().flatten()
    }

    pub fn get_size(&self, handle: WorkQueueHandle) -> usize {
        self.queue(handle).map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn name(&self, handle: WorkQueueHandle) -> Option<String> {
        self.queue(handle).map(|queue| queue.name().to_string())
    }

    pub(crate) fn attach_worker(&self, handle: WorkQueueHandle) -> Result<String, QueueError> {
        let mut slots = self.slots()?;
        let slot = live_slot_mut(&mut slots, handle).ok_or(QueueError::InvalidHandle)?;
        let name = slot
            .queue
            .as_ref()
            .map(|queue| queue.name().to_string())
            .unwrap_or_default();
        if slot.worker_attached {
            return Err(QueueError::WorkerAlreadyAttached { name });
        }
        slot.worker_attached = true;
        Ok(name)
    }

    pub(crate) fn detach_worker(&self, handle: WorkQueueHandle) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(slot) = live_slot_mut(&mut slots, handle) {
            slot.worker_attached = false;
        }
    }

    pub fn has_worker(&self, handle: WorkQueueHandle) -> bool {
        self.slots()
            .ok()
            .and_then(|slots| live_slot(&slots, handle).map(|slot| slot.worker_attached))
            .unwrap_or(false)
    }
}

fn next_generation(current: u32) -> u32 {
    match current.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

fn live_slot(slots: &[Slot], handle: WorkQueueHandle) -> Option<&Slot> {
    if handle.is_null() {
        return None;
    }
    slots
        .get(handle.index as usize)
        .filter(|slot| slot.generation == handle.generation && slot.queue.is_some())
}

fn live_slot_mut(slots: &mut [Slot], handle: WorkQueueHandle) -> Option<&mut Slot> {
    if handle.is_null() {
        return None;
    }
    slots
        .get_mut(handle.index as usize)
        .filter(|slot| slot.generation == handle.generation && slot.queue.is_some())
}

/// Enqueue-only view of one queue, cloned into producers such as handlers
/// and the orchestration state machine.
#[derive(Debug, Clone)]
pub struct QueueSender {
    registry: Arc<WorkQueueRegistry>,
    handle: WorkQueueHandle,
}

impl QueueSender {
    pub fn new(registry: Arc<WorkQueueRegistry>, handle: WorkQueueHandle) -> Self {
        Self { registry, handle }
    }

    pub fn send(&self, payload: &str) -> bool {
        self.registry.enqueue_work(self.handle, payload)
    }

    pub(crate) fn send_internal(&self, payload: &str) -> bool {
        self.registry.enqueue_internal(self.handle, payload)
    }

    pub fn handle(&self) -> WorkQueueHandle {
        self.handle
    }

    pub fn pending(&self) -> usize {
        self.registry.get_size(self.handle)
    }
}
