//! Tracked asynchronous work.
//!
//! A [`WorkTracker`] spawns detached units of work on the tokio runtime and
//! remembers them until they settle, so graceful shutdown can wait for side
//! effects that are still in flight.
//!
//! The tracker remembers the runtime it was created in (or the first one it
//! sees), so work tracked from a plain OS thread still lands on that runtime.
//!
//! ```
//! use trellis_core::WorkTracker;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let tracker = WorkTracker::new();
//!
//! tracker.track(async {
//!     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//! });
//!
//! assert_eq!(tracker.pending(), 1);
//! tracker.wait_for_pending().await;
//! assert_eq!(tracker.pending(), 0);
//! # }
//! ```

use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Default)]
struct Inner {
    outstanding: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
    settled: Notify,
    runtime: Mutex<Option<Handle>>,
}

/// Set of in-flight asynchronous work.
///
/// Entries are added when work is spawned and removed when it settles,
/// whether it completed, failed or panicked.
#[derive(Clone, Default)]
pub struct WorkTracker {
    inner: Arc<Inner>,
}

/// Removes an entry from the outstanding set when dropped, which also covers
/// tasks that unwind or are cancelled by runtime shutdown.
struct Settle {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.inner.outstanding.lock().remove(&self.id);
        self.inner.settled.notify_waiters();
    }
}

impl WorkTracker {
    /// Create an empty tracker bound to the current runtime, if any
    pub fn new() -> Self {
        let tracker = Self::default();
        if let Ok(handle) = Handle::try_current() {
            tracker.bind_runtime(handle);
        }
        tracker
    }

    /// Spawn tracked work on `handle` from now on
    pub fn bind_runtime(&self, handle: Handle) {
        *self.inner.runtime.lock() = Some(handle);
    }

    /// Runtime that tracked work is spawned on.
    ///
    /// Prefers the caller's runtime context. Without one, falls back to the
    /// bound runtime. The first runtime seen is remembered when none is bound.
    pub fn runtime(&self) -> Option<Handle> {
        let mut bound = self.inner.runtime.lock();
        match Handle::try_current() {
            Ok(current) => {
                if bound.is_none() {
                    *bound = Some(current.clone());
                }
                Some(current)
            }
            Err(_) => bound.clone(),
        }
    }

    /// Spawn `work` on the tracker's runtime and track it until it settles.
    ///
    /// Returns `None`, and drops the work, when there is neither a current
    /// nor a bound runtime.
    pub fn track<F>(&self, work: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(handle) = self.runtime() else {
            error!("No async runtime available, dropping tracked work");
            return None;
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.outstanding.lock().insert(id);

        let settle = Settle {
            inner: self.inner.clone(),
            id,
        };

        debug!(work_id = id, "Tracking pending work");
        Some(handle.spawn(async move {
            let _settle = settle;
            work.await;
        }))
    }

    /// Number of entries that have not settled yet
    pub fn pending(&self) -> usize {
        self.inner.outstanding.lock().len()
    }

    /// Whether no work is outstanding
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Wait until the outstanding set is empty.
    ///
    /// The set is re-checked after every settle, so work tracked while the
    /// wait is in progress is awaited as well.
    pub async fn wait_for_pending(&self) {
        loop {
            let settled = self.inner.settled.notified();
            tokio::pin!(settled);
            // Register before checking so a settle in between is not missed.
            settled.as_mut().enable();

            let pending = self.pending();
            if pending == 0 {
                return;
            }

            debug!(pending, "Waiting for pending work to settle");
            settled.await;
        }
    }

    /// Like [`WorkTracker::wait_for_pending`], giving up after `limit`.
    ///
    /// Returns `false` when work was still outstanding at the deadline.
    pub async fn wait_for_pending_timeout(&self, limit: Duration) -> bool {
        match tokio::time::timeout(limit, self.wait_for_pending()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pending = self.pending(),
                    timeout = ?limit,
                    "Timed out waiting for pending work"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for WorkTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkTracker")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_idle() {
        let tracker = WorkTracker::new();
        assert!(tracker.is_idle());
        tracker.wait_for_pending().await;
    }

    #[tokio::test]
    async fn test_wait_blocks_until_work_settles() {
        let tracker = WorkTracker::new();
        let (tx, rx) = oneshot::channel::<()>();
        let done = Arc::new(AtomicBool::new(false));

        let flag = done.clone();
        tracker.track(async move {
            let _ = rx.await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tracker.pending(), 1);

        assert!(!tracker.wait_for_pending_timeout(Duration::from_millis(20)).await);

        tx.send(()).unwrap();
        tracker.wait_for_pending().await;

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_work_still_settles() {
        let tracker = WorkTracker::new();

        let handle = tracker
            .track(async {
                panic!("boom");
            })
            .unwrap();

        assert!(handle.await.unwrap_err().is_panic());
        tracker.wait_for_pending().await;
        assert!(tracker.is_idle());
    }

    #[tokio::test]
    async fn test_work_added_during_wait_is_awaited() {
        let tracker = WorkTracker::new();
        let (tx, rx) = oneshot::channel::<()>();
        let late_done = Arc::new(AtomicBool::new(false));

        let inner_tracker = tracker.clone();
        let flag = late_done.clone();
        tracker.track(async move {
            let _ = rx.await;
            inner_tracker.track(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
            });
        });

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_pending().await })
        };

        tx.send(()).unwrap();
        waiter.await.unwrap();

        assert!(late_done.load(Ordering::SeqCst));
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_track_outside_runtime_drops_work() {
        let tracker = WorkTracker::new();
        assert!(tracker.runtime().is_none());
        assert!(tracker.track(async {}).is_none());
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_track_from_plain_thread_uses_bound_runtime() {
        let tracker = WorkTracker::new();
        let done = Arc::new(AtomicBool::new(false));

        let worker = tracker.clone();
        let flag = done.clone();
        let spawned = std::thread::spawn(move || {
            worker
                .track(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    flag.store(true, Ordering::SeqCst);
                })
                .is_some()
        })
        .join()
        .unwrap();

        assert!(spawned);
        tracker.wait_for_pending().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_bind_runtime_outside_any_context() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let tracker = WorkTracker::new();
        tracker.bind_runtime(runtime.handle().clone());

        let (tx, rx) = oneshot::channel::<u32>();
        assert!(
            tracker
                .track(async move {
                    let _ = tx.send(7);
                })
                .is_some()
        );

        assert_eq!(runtime.block_on(rx).unwrap(), 7);
        runtime.block_on(tracker.wait_for_pending());
        assert!(tracker.is_idle());
    }
}
