//! Lifecycle management for the daemon's background tasks.
//!
//! Signal forwarders and similar long-running helpers are spawned through
//! the task manager so shutdown can cancel and await every one of them.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct TaskManager {
    tasks: HashMap<String, JoinHandle<Result<()>>>,
    global_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns and registers a named task. The task receives a child token
    /// of the manager's cancellation token and should exit promptly once
    /// it is cancelled.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.global_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Task '{task_name}' starting");
            let result = task_fn(token).await;
            match &result {
                Ok(()) => info!("Task '{task_name}' finished"),
                Err(e) => error!("Task '{task_name}' failed: {e:#}"),
            }
            result
        });

        self.tasks.insert(name, handle);
        Ok(())
    }

    /// Cancels every task and waits for all of them to wind down. Returns
    /// the first failure encountered, if any.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping {} background tasks", self.tasks.len());
        self.global_token.cancel();

        let mut first_error = None;
        for (name, handle) in self.tasks.drain() {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!("Task '{name}' failed during shutdown: {e:#}");
                    first_error.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    warn!("Task '{name}' panicked: {e}");
                    first_error.get_or_insert(anyhow::anyhow!("task '{name}' panicked: {e}"));
                }
                Err(_) => {
                    warn!("Task '{name}' ignored cancellation");
                    first_error
                        .get_or_insert(anyhow::anyhow!("task '{name}' shutdown timed out"));
                }
            }
        }

        match first_error {
            Some(e) => Err(e).context("One or more tasks failed during shutdown"),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    #[tokio::test]
    async fn spawned_task_is_tracked_and_cancelled() {
        let mut manager = TaskManager::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let witness = cancelled.clone();

        manager
            .spawn_task("waiter".to_string(), move |token| async move {
                token.cancelled().await;
                witness.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert!(manager.is_running("waiter"));
        assert_eq!(manager.active_count(), 1);

        manager.shutdown_all().await.unwrap();
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_surfaces_task_failures() {
        let mut manager = TaskManager::new();
        manager
            .spawn_task("broken".to_string(), |_token| async {
                Err(anyhow::anyhow!("boom"))
            })
            .await
            .unwrap();

        let result = manager.shutdown_all().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn shutdown_with_no_tasks_is_clean() {
        let mut manager = TaskManager::new();
        assert!(manager.shutdown_all().await.is_ok());
    }
}
