// Background worker: join-able task execution with error capture
//
// Network and filesystem work runs off the caller's thread; a panic in a
// worker is captured and reported as an error instead of escaping the
// runtime. A worker that has not started yet can be cancelled; a running
// worker always runs to completion.

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub struct Worker<T> {
    handle: JoinHandle<Option<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let handle = tokio::spawn(async move {
            if flag.load(Ordering::SeqCst) {
                return None;
            }
            Some(task.await)
        });
        Self { handle, cancelled }
    }

    /// Run blocking work on the runtime's blocking pool.
    pub fn spawn_blocking<F>(task: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::spawn(async move {
            match tokio::task::spawn_blocking(task).await {
                Ok(value) => value,
                Err(err) => std::panic::resume_unwind(err.into_panic()),
            }
        })
    }

    /// Request cancellation. Effective only if the task has not started.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Wait for completion. `Ok(None)` means the task was cancelled
    /// before it started; a panic becomes an error.
    pub async fn join(self) -> Result<Option<T>> {
        self.handle
            .await
            .map_err(|err| anyhow!("background task failed: {}", err))
    }
}

lazy_static! {
    static ref INSTALL_LOCKS: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>> =
        Mutex::new(HashMap::new());
}

/// Per-package-key mutex serializing install/update/uninstall. A second
/// request for the same key queues behind the first instead of being
/// rejected.
pub fn install_lock(key: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = INSTALL_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
    Arc::clone(locks.entry(key.to_string()).or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_returns_task_result() {
        let worker = Worker::spawn(async { 41 + 1 });
        assert_eq!(worker.join().await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn panic_is_captured_as_error() {
        let worker = Worker::spawn_blocking(|| -> u32 { panic!("boom") });
        assert!(worker.join().await.is_err());
    }

    #[tokio::test]
    async fn same_key_installs_are_serialized() {
        let lock = install_lock("pkg-x");
        let guard = lock.lock().await;
        let second = install_lock("pkg-x");
        assert!(second.try_lock().is_err());
        drop(guard);
        assert!(second.try_lock().is_ok());
    }
}
