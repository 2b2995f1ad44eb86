// Sentinel Center - Background Tasks
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Cancellable background tasks that stream log lines.
//!
//! A task reports on a single ordered channel: any number of
//! [`TaskEvent::Log`] followed by exactly one [`TaskEvent::Finished`].

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Final result of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(String),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Something a task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent<T> {
    Log(String),
    Finished(Outcome<T>),
}

/// Handle used inside a running task.
pub struct TaskContext<T> {
    events: mpsc::UnboundedSender<TaskEvent<T>>,
    cancel: watch::Receiver<bool>,
}

impl<T> TaskContext<T> {
    /// Emit a log line. Lines after cancellation are dropped.
    pub fn log(&self, line: impl Into<String>) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.events.send(TaskEvent::Log(line.into()));
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// handle went away without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Caller side of a running task.
pub struct TaskHandle<T> {
    events: mpsc::UnboundedReceiver<TaskEvent<T>>,
    cancel: Arc<watch::Sender<bool>>,
}

/// Cancels a task from anywhere.
#[derive(Clone)]
pub struct Canceller(Arc<watch::Sender<bool>>);

impl Canceller {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Run `body` on the tokio runtime. Its return value becomes the
    /// `Finished` event.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext<T>) -> Fut,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let ctx = TaskContext {
            events: event_tx.clone(),
            cancel: cancel_rx,
        };
        let fut = body(ctx);
        tokio::spawn(async move {
            let outcome = fut.await;
            let _ = event_tx.send(TaskEvent::Finished(outcome));
        });

        Self {
            events: event_rx,
            cancel: Arc::new(cancel_tx),
        }
    }

    /// Ask the task to stop. The task finishes with `Cancelled`.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn canceller(&self) -> Canceller {
        Canceller(self.cancel.clone())
    }

    /// Next event, `None` after `Finished` has been taken.
    pub async fn next_event(&mut self) -> Option<TaskEvent<T>> {
        self.events.recv().await
    }

    /// Drain the task, handing each log line to `on_log`.
    pub async fn wait(mut self, mut on_log: impl FnMut(&str)) -> Outcome<T> {
        while let Some(event) = self.events.recv().await {
            match event {
                TaskEvent::Log(line) => on_log(&line),
                TaskEvent::Finished(outcome) => return outcome,
            }
        }
        Outcome::Failure("task ended without a result".to_string())
    }
}

/// Run a child process, streaming stdout and stderr line by line.
///
/// Returns the exit code, `-1` for a signal, or `None` if the task was
/// cancelled, in which case the child has been killed.
pub(crate) async fn run_streaming<T>(
    ctx: &TaskContext<T>,
    argv: &[String],
    mut on_line: impl FnMut(&str),
) -> Result<Option<i32>> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("Empty command line"))?;

    debug!("Spawning: {}", argv.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {}", program))?;

    let stdout = child.stdout.take().ok_or_else(|| anyhow!("No stdout pipe"))?;
    let stderr = child.stderr.take().ok_or_else(|| anyhow!("No stderr pipe"))?;
    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let (mut out_open, mut err_open) = (true, true);

    while out_open || err_open {
        tokio::select! {
            _ = ctx.cancelled() => {
                kill_child(&mut child, program).await;
                return Ok(None);
            }
            line = out_lines.next_line(), if out_open => match line? {
                Some(line) => {
                    on_line(&line);
                    ctx.log(line);
                }
                None => out_open = false,
            },
            line = err_lines.next_line(), if err_open => match line? {
                Some(line) => {
                    on_line(&line);
                    ctx.log(line);
                }
                None => err_open = false,
            },
        }
    }

    let status = tokio::select! {
        _ = ctx.cancelled() => {
            kill_child(&mut child, program).await;
            return Ok(None);
        }
        status = child.wait() => status.context("Failed to wait for child")?,
    };
    Ok(Some(status.code().unwrap_or(-1)))
}

/// Kill a cancelled child. An elevated child may outlive a failed kill.
async fn kill_child(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill {}, it may still be running: {}", program, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn test_lines_then_one_finished() {
        let handle = TaskHandle::spawn(|ctx| async move {
            match run_streaming(&ctx, &sh("echo one; echo two >&2; exit 3"), |_| {}).await {
                Ok(Some(code)) => Outcome::Success(code),
                Ok(None) => Outcome::Cancelled,
                Err(e) => Outcome::Failure(e.to_string()),
            }
        });

        let mut lines = Vec::new();
        let outcome = handle.wait(|l| lines.push(l.to_string())).await;
        lines.sort();
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(outcome, Outcome::Success(3));
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let mut handle = TaskHandle::spawn(|ctx| async move {
            match run_streaming(&ctx, &sh("echo started; sleep 30; echo late"), |_| {}).await {
                Ok(None) => Outcome::Cancelled,
                Ok(Some(code)) => Outcome::Success(code),
                Err(e) => Outcome::Failure(e.to_string()),
            }
        });

        assert_eq!(handle.next_event().await, Some(TaskEvent::Log("started".into())));
        handle.canceller().cancel();

        assert_eq!(
            handle.next_event().await,
            Some(TaskEvent::Finished(Outcome::Cancelled))
        );
        assert_eq!(handle.next_event().await, None);
    }

    #[tokio::test]
    async fn test_cancel_after_output_closed() {
        let mut handle = TaskHandle::spawn(|ctx| async move {
            let script = sh("echo closing; exec >&- 2>&-; sleep 30");
            match run_streaming(&ctx, &script, |_| {}).await {
                Ok(None) => Outcome::Cancelled,
                Ok(Some(code)) => Outcome::Success(code),
                Err(e) => Outcome::Failure(e.to_string()),
            }
        });

        assert_eq!(handle.next_event().await, Some(TaskEvent::Log("closing".into())));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.cancel();
        assert_eq!(
            handle.next_event().await,
            Some(TaskEvent::Finished(Outcome::Cancelled))
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let handle = TaskHandle::<()>::spawn(|ctx| async move {
            match run_streaming(&ctx, &["definitely-not-a-real-binary-xyz".to_string()], |_| {}).await {
                Ok(_) => Outcome::Success(()),
                Err(e) => Outcome::Failure(e.to_string()),
            }
        });
        assert!(matches!(handle.wait(|_| {}).await, Outcome::Failure(_)));
    }
}
