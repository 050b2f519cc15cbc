use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub(crate) const WORKER_DEFAULT_POLL_MS: u64 = 100;
pub(crate) const WORKER_MIN_POLL_MS: u64 = 1;
pub(crate) const WORKER_MAX_POLL_MS: u64 = 60_000;
const SLEEP_SLICE_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Started {
        worker_id: String,
        at: i64,
    },
    Processed {
        worker_id: String,
        at: i64,
    },
    Error {
        worker_id: String,
        at: i64,
        message: String,
        fatal: bool,
    },
    Stopped {
        worker_id: String,
        at: i64,
    },
}

/// Sleeps in short slices so a stop request is observed promptly.
/// Returns false if the stop flag was raised.
pub(crate) fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let step = remaining.min(Duration::from_millis(SLEEP_SLICE_MS));
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !stop.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleep_with_stop_returns_immediately_when_stopped() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_with_stop(&stop, Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_with_stop_completes_when_not_stopped() {
        let stop = AtomicBool::new(false);
        assert!(sleep_with_stop(&stop, Duration::from_millis(5)));
    }
}
