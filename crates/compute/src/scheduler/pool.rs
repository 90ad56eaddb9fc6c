use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

/// Fixed-size execution pool: at most `capacity` submitted futures run at once.
///
/// Submissions beyond capacity wait for a permit. Aborting a handle releases
/// its permit whether it was waiting or running.
pub struct ExecutionPool {
    permits: Arc<Semaphore>,
    capacity: AtomicUsize,
    running: Arc<AtomicUsize>,
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ExecutionPool {
    /// Upper bound on concurrent slots. Keeps permit arithmetic within the
    /// semaphore's limits.
    pub const MAX_CAPACITY: usize = 1 << 16;

    /// Create a pool with `capacity` slots, clamped to `1..=MAX_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Self::MAX_CAPACITY);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity: AtomicUsize::new(capacity),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn `work` on the current runtime, gated by a pool permit.
    pub fn submit<F>(&self, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            running.fetch_add(1, Ordering::SeqCst);
            let _guard = RunningGuard(running);
            work.await;
        })
    }

    /// Change the number of concurrent slots, clamped like [`new`](Self::new).
    /// Shrinking takes effect as running work finishes.
    pub fn resize(&self, capacity: usize) {
        let capacity = capacity.clamp(1, Self::MAX_CAPACITY);
        let previous = self.capacity.swap(capacity, Ordering::SeqCst);
        if capacity > previous {
            self.permits.add_permits(capacity - previous);
        } else if capacity < previous {
            let surplus = (previous - capacity) as u32;
            let permits = Arc::clone(&self.permits);
            tokio::spawn(async move {
                if let Ok(taken) = permits.acquire_many_owned(surplus).await {
                    taken.forget();
                }
            });
        }
        debug!(previous, capacity, "execution pool resized");
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Futures currently holding a permit.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}
