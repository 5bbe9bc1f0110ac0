//! Process-wide shutdown flag, set from the Ctrl-C handler.
//!
//! Relaxed atomics are enough for a one-way "stop" flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Request a cooperative shutdown (idempotent).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Sleep for `total`, waking early on shutdown. Returns false if shutdown was requested.
pub fn sleep_unless_requested(total: Duration) -> bool {
    let deadline = Instant::now() + total;
    while !is_requested() {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
    false
}

#[cfg(test)]
pub fn reset() {
    SHUTDOWN.store(false, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn sleep_returns_early_on_request() {
        reset();
        let t = thread::spawn(|| {
            thread::sleep(Duration::from_millis(50));
            request();
        });
        let start = Instant::now();
        assert!(!sleep_unless_requested(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(2));
        t.join().unwrap();
        reset();
    }

    #[test]
    #[serial]
    fn sleep_completes_without_request() {
        reset();
        assert!(sleep_unless_requested(Duration::from_millis(20)));
    }
}
