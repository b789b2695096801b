// src/tasks.rs

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Handle to a cancellable periodic background task.
///
/// The limiter sweep, the cache sweep and the health-probe loop all run
/// through this primitive so they can be started once at process startup
/// and stopped cleanly on shutdown. Dropping the handle does not stop the
/// task; call [`BackgroundTask::stop`].
#[derive(Debug)]
pub struct BackgroundTask {
    cancel_flag: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn a task that runs `tick` every `interval` until stopped.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel_flag);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);

            loop {
                // Check if we should stop
                if flag.load(Ordering::SeqCst) {
                    break;
                }

                ticker.tick().await;
                tick().await;
            }

            debug!(task = name, "Background task stopped");
        });

        Self {
            cancel_flag,
            handle,
        }
    }

    /// Request the task to stop after its current iteration.
    pub fn stop(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Abort the task immediately.
    pub fn abort(self) {
        self.handle.abort();
    }
}
