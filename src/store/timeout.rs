//! Bounded waits on calls that may hang.
//!
//! A call runs on a small rayon pool; the caller waits up to a timeout. When the
//! wait expires the call is *abandoned*, not cancelled: it keeps running on its
//! worker (possibly forever, against a stuck mount) and its result is dropped.
//!
//! At most `threads` calls are in flight at once, queued or running. Further
//! calls are refused with `Saturated` instead of queueing behind abandoned work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::errors::StoreError;

/// Result of a bounded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimedCall<T> {
    Completed(T),
    /// No answer within `after`; the work may still be running.
    Abandoned { after: Duration },
    /// The worker died (panicked) before answering.
    WorkerLost,
    /// Every worker is still busy with earlier calls; `f` was not run.
    Saturated { in_flight: usize },
}

/// Decrements the in-flight count when the job ends, panics included.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TimeoutPool {
    pool: rayon::ThreadPool,
    threads: usize,
    in_flight: Arc<AtomicUsize>,
}

impl TimeoutPool {
    pub fn new(name: &str, threads: usize) -> Result<Self, StoreError> {
        let prefix = name.to_string();
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .panic_handler(|_| error!("Timed call panicked on its worker"))
            .build()
            .map_err(|e| StoreError::Environment(format!("cannot start worker pool: {e}")))?;
        Ok(Self { pool, threads, in_flight: Arc::new(AtomicUsize::new(0)) })
    }

    /// Calls queued or running, abandoned ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run `f` on the pool and wait at most `timeout` for its result.
    pub fn call<T, F>(&self, timeout: Duration, f: F) -> TimedCall<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if previous >= self.threads {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!(in_flight = previous, "Timed call refused; all workers busy");
            return TimedCall::Saturated { in_flight: previous };
        }
        let guard = InFlight(Arc::clone(&self.in_flight));
        let (tx, rx) = mpsc::sync_channel(1);
        self.pool.spawn(move || {
            let _guard = guard;
            // Receiver may be gone after abandonment; that is fine.
            let _ = tx.send(f());
        });
        match rx.recv_timeout(timeout) {
            Ok(v) => TimedCall::Completed(v),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Timed call abandoned");
                TimedCall::Abandoned { after: timeout }
            }
            Err(RecvTimeoutError::Disconnected) => TimedCall::WorkerLost,
        }
    }
}
