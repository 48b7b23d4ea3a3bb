// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Detached background work with its own deadline.
//!
//! Webhook fan-out, media downloads, auto-replies and call handling run here
//! so a slow endpoint never stalls a tenant's event router. Failures are
//! logged and never reach the code that submitted the task.
//!
//! Tasks with several I/O steps use [`TaskRunner::spawn_steps`] and bound
//! each step with [`TaskRunner::bounded`], so a step that overruns its
//! deadline is skipped without cancelling the steps after it.

use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use switchboard_core::SwitchboardError;

/// Spawns tracked tasks, each bounded by a timeout.
#[derive(Clone)]
pub struct TaskRunner {
    tracker: TaskTracker,
    timeout: Duration,
}

impl TaskRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tracker: TaskTracker::new(),
            timeout,
        }
    }

    /// Runs `task` in the background, cancelling it after the runner's timeout.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), SwitchboardError>> + Send + 'static,
    {
        let timeout = self.timeout;
        self.tracker.spawn(async move {
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(())) => debug!(task = name, "background task finished"),
                Ok(Err(e)) => warn!(task = name, error = %e, "background task failed"),
                Err(_) => warn!(
                    task = name,
                    timeout_secs = timeout.as_secs(),
                    "background task timed out"
                ),
            }
        });
    }

    /// Runs a multi-step task with no overall deadline.
    ///
    /// Each I/O step inside `task` is expected to go through [`Self::bounded`].
    pub fn spawn_steps<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), SwitchboardError>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match task.await {
                Ok(()) => debug!(task = name, "background task finished"),
                Err(e) => warn!(task = name, error = %e, "background task failed"),
            }
        });
    }

    /// Runs one step under the runner's timeout.
    pub async fn bounded<T, F>(&self, step: &'static str, fut: F) -> Result<T, SwitchboardError>
    where
        F: Future<Output = Result<T, SwitchboardError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    step,
                    timeout_secs = self.timeout.as_secs(),
                    "background step timed out"
                );
                Err(SwitchboardError::Timeout {
                    duration: self.timeout,
                })
            }
        }
    }

    /// Runs a long-lived task with no deadline (event routers, history sync).
    pub fn spawn_unbounded<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            task.await;
            debug!(task = name, "background task exited");
        });
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until no tracked task is running, or `limit` elapses.
    ///
    /// Returns whether the runner went idle.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while !self.tracker.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Closes the tracker and waits up to `grace` for in-flight tasks.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "timeout reached, some background tasks interrupted"
            );
        } else {
            info!("background tasks drained");
        }
    }
}
