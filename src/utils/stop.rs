//! Cooperative cancellation for polling loops.
//!
//! A [`StopFlag`] is set once (typically from a SIGINT/SIGTERM handler
//! registered in `main`) and observed between iterations of the polling
//! loops: log tail, connector tail, directory tail, device-posture tail.
//! In-flight HTTP requests are never interrupted; they complete or time
//! out on their own.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

/// Clonable stop flag shared between the signal handler and polling loops.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<Inner>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the flag as set and wake up any waiter.
    pub fn trigger(&self) {
        let mut stopped = self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *stopped = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep up to `timeout`, returning early if the flag gets set.
    /// Returns true when the flag is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _result) = self
                .inner
                .condvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            stopped = guard;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_unset() {
        let flag = StopFlag::new();
        assert!(!flag.is_set());
    }

    #[test]
    fn trigger_sets_the_flag() {
        let flag = StopFlag::new();
        flag.trigger();
        assert!(flag.is_set());
        // waiting on a set flag returns immediately
        assert!(flag.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn wait_times_out_when_unset() {
        let flag = StopFlag::new();
        let start = Instant::now();
        assert!(!flag.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn trigger_wakes_a_waiter() {
        let flag = StopFlag::new();
        let waiter = flag.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        flag.trigger();
        assert!(handle.join().unwrap());
    }
}
