use chrono::{DateTime, Utc};

/// Who put an item on the queue. Only the agent itself can enqueue
/// [`ItemOrigin::Internal`] items; everything a producer sends through a
/// [`super::QueueSender`] is [`ItemOrigin::External`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemOrigin {
    #[default]
    External,
    Internal,
}

/// One unit of work: an owned copy of the submitted payload and its arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub payload: String,
    pub origin: ItemOrigin,
    pub arrived_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(payload: &str) -> Self {
        Self::with_origin(payload, ItemOrigin::External)
    }

    pub fn with_origin(payload: &str, origin: ItemOrigin) -> Self {
        Self {
            payload: payload.to_string(),
            origin,
            arrived_at: Utc::now(),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.origin == ItemOrigin::Internal
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.arrived_at)
    }
}
