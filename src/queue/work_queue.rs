use super::{ItemOrigin, QueueError, WorkItem};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Named FIFO of work items; every operation is serialized by one lock.
#[derive(Debug)]
pub struct WorkQueue {
    name: String,
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enqueue(&self, payload: &str) -> Result<(), QueueError> {
        self.push(WorkItem::new(payload))
    }

    pub(crate) fn enqueue_internal(&self, payload: &str) -> Result<(), QueueError> {
        self.push(WorkItem::with_origin(payload, ItemOrigin::Internal))
    }

    fn push(&self, item: WorkItem) -> Result<(), QueueError> {
        let mut items = self
            .items
            .lock()
            .map_err(|err| QueueError::LockPoisoned(err.to_string()))?;
        items
            .try_reserve(1)
            .map_err(|_| QueueError::AllocationFailed {
                name: self.name.clone(),
            })?;
        items.push_back(item);
        Ok(())
    }

    pub fn dequeue(&self) -> Result<Option<WorkItem>, QueueError> {
        let mut items = self
            .items
            .lock()
            .map_err(|err| QueueError::LockPoisoned(err.to_string()))?;
        Ok(items.pop_front())
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .map(|items| items.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every pending item and returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        let discarded = items.len();
        items.clear();
        discarded
    }
}
