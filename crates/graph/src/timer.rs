use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::GraphError;

/// Shared delay timer for deferred forwarding.
///
/// Holds a runtime handle so notifications raised on plain threads can
/// still schedule work.
#[derive(Clone, Debug)]
pub struct Timer {
    handle: Handle,
}

impl Timer {
    /// Timer bound to the runtime of the calling context.
    pub fn current() -> Result<Self, GraphError> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|_| GraphError::NoRuntime)
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `f` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn current_without_runtime_fails() {
        assert!(matches!(Timer::current(), Err(GraphError::NoRuntime)));
    }

    #[tokio::test]
    async fn schedule_runs_after_delay() {
        let timer = Timer::current().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let handle = timer.schedule(Duration::from_millis(30), move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(!fired.load(Ordering::SeqCst));

        handle.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }
}
