//! Cross-thread stop signal for the polling loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Controller-side handle to the polling loop's stop flag.
///
/// The flag is the only state shared between the polling thread and the
/// controller.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    grace_period: Duration,
}

impl StopHandle {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            grace_period,
        }
    }

    /// Signal the loop to exit after its in-flight tick. Returns immediately.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Wait out the grace period, then signal the loop.
    ///
    /// Blocks the calling thread; guarantees at least `grace_period` of
    /// collection from the moment it is called.
    pub fn stop(&self) {
        debug!("Stopping after {:?} grace period", self.grace_period);
        std::thread::sleep(self.grace_period);
        self.request_stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_request_stop_is_shared() {
        let handle = StopHandle::new(Duration::ZERO);
        let other = handle.clone();
        assert!(!other.is_stop_requested());

        handle.request_stop();
        assert!(other.is_stop_requested());
    }

    #[test]
    fn test_stop_waits_grace_period() {
        let handle = StopHandle::new(Duration::from_millis(30));
        let start = Instant::now();
        handle.stop();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(handle.is_stop_requested());
    }

    #[test]
    fn test_visible_across_threads() {
        let handle = StopHandle::new(Duration::ZERO);
        let remote = handle.clone();
        std::thread::spawn(move || remote.request_stop())
            .join()
            .unwrap();
        assert!(handle.is_stop_requested());
    }
}
