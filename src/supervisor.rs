//! Supervised tasks that report how they ended.

use std::{fmt, future::Future, time::Duration};

use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::AbortHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    Completed,
    /// Error chain, or the panic message.
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub exit: TaskExit,
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exit {
            TaskExit::Completed => write!(f, "task `{}` completed", self.name),
            TaskExit::Failed(reason) => write!(f, "task `{}` failed: {reason}", self.name),
            TaskExit::Cancelled => write!(f, "task `{}` was cancelled", self.name),
        }
    }
}

/// Spawns named tasks, publishes exactly one [`TaskReport`] per task and
/// hands out a shared cancellation token.
pub struct Supervisor {
    token: CancellationToken,
    reports_tx: UnboundedSender<TaskReport>,
    reports_rx: UnboundedReceiver<TaskReport>,
    tasks: Vec<(String, AbortHandle)>,
    running: usize,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (reports_tx, reports_rx) = unbounded_channel();
        Self {
            token: CancellationToken::new(),
            reports_tx,
            reports_rx,
            tasks: vec![],
            running: 0,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tasks spawned and not yet reported.
    pub fn running(&self) -> usize {
        self.running
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let inner = tokio::spawn(fut);
        self.tasks.push((name.clone(), inner.abort_handle()));
        self.running += 1;

        let reports = self.reports_tx.clone();
        tokio::spawn(async move {
            let exit = match inner.await {
                Ok(Ok(())) => TaskExit::Completed,
                Ok(Err(e)) => TaskExit::Failed(format!("{e:#}")),
                Err(join) if join.is_cancelled() => TaskExit::Cancelled,
                Err(join) => TaskExit::Failed(format!("panicked: {}", panic_message(join))),
            };
            debug!(task = %name, ?exit, "task finished");
            let _ = reports.send(TaskReport { name, exit });
        });
    }

    /// Wait for the next finished task. `None` once nothing is running.
    pub async fn next_report(&mut self) -> Option<TaskReport> {
        if self.running == 0 {
            return None;
        }
        let report = self.reports_rx.recv().await?;
        self.running -= 1;
        Some(report)
    }

    /// Cancel the token, collect reports for up to `grace`, then abort the rest.
    pub async fn shutdown(mut self, grace: Duration) -> Vec<TaskReport> {
        self.token.cancel();
        let mut reports = vec![];

        let collected = timeout(grace, async {
            while let Some(report) = self.next_report().await {
                reports.push(report);
            }
        })
        .await;

        if collected.is_err() {
            for (name, handle) in &self.tasks {
                if !handle.is_finished() {
                    warn!(task = %name, "task ignored cancellation, aborting");
                    handle.abort();
                }
            }
            while let Some(report) = self.next_report().await {
                reports.push(report);
            }
        }
        reports
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into()),
        Err(err) => err.to_string(),
    }
}
