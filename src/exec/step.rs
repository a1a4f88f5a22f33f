// src/exec/step.rs

//! Runs one build step as a supervised child process.
//!
//! Each step moves through `Spawned → Streaming → Exited { code }`. stdout
//! and stderr are read by one pump task each; a pump feeds its own
//! [`LineFramer`] and publishes every completed line as soon as it arrives.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::CancelSignal;
use crate::exec::framer::LineFramer;
use crate::fabric::LogPublisher;
use crate::types::{BuildJob, LogStream, Slug, StepSpec};

const READ_CHUNK: usize = 8 * 1024;

/// Lifecycle of a running step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Spawned,
    Streaming,
    Exited { code: i32 },
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    /// Non-zero exit; `-1` when the process was killed by a signal.
    Failed { code: i32 },
    /// The process could not be started at all.
    SpawnFailed { message: String },
    Cancelled,
}

struct StepRun<'a> {
    slug: &'a Slug,
    step: &'a str,
    state: StepState,
}

impl StepRun<'_> {
    fn advance(&mut self, next: StepState) {
        debug!(slug = %self.slug, step = self.step, from = ?self.state, to = ?next, "step state");
        self.state = next;
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(cmd_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    }
}

/// Run `step` of `job` to completion, streaming its output through
/// `publisher`.
///
/// `drain_timeout` bounds how long the pumps may keep reading after the
/// process exited (a grandchild can keep a pipe open).
pub async fn run_step(
    job: &BuildJob,
    step: &StepSpec,
    publisher: &LogPublisher,
    cancel: &mut CancelSignal,
    drain_timeout: Duration,
) -> StepOutcome {
    let mut cmd = shell_command(&step.cmd);
    cmd.current_dir(&job.working_dir)
        .envs(&job.env)
        .envs(&step.env)
        .env("SLUG", job.slug.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(slug = %job.slug, step = %step.name, error = %e, "failed to spawn step");
            return StepOutcome::SpawnFailed {
                message: format!("failed to start '{}': {e}", step.cmd),
            };
        }
    };

    let mut run = StepRun {
        slug: &job.slug,
        step: &step.name,
        state: StepState::Spawned,
    };
    info!(slug = %job.slug, step = %step.name, pid = ?child.id(), "step process spawned");

    let (detach_tx, detach_rx) = watch::channel(false);
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        let task = pump(stdout, job.slug.clone(), LogStream::Stdout, publisher.clone(), detach_rx.clone());
        pumps.push(tokio::spawn(task));
    }
    if let Some(stderr) = child.stderr.take() {
        let task = pump(stderr, job.slug.clone(), LogStream::Stderr, publisher.clone(), detach_rx);
        pumps.push(tokio::spawn(task));
    }
    run.advance(StepState::Streaming);

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                run.advance(StepState::Exited { code });
                if status.success() {
                    StepOutcome::Succeeded
                } else {
                    StepOutcome::Failed { code }
                }
            }
            Err(e) => {
                warn!(slug = %job.slug, step = %step.name, error = %e, "waiting for step process failed");
                StepOutcome::Failed { code: -1 }
            }
        },
        _ = cancel.cancelled() => {
            info!(slug = %job.slug, step = %step.name, "cancellation requested; killing step process");
            kill(&mut child, &job.slug, &step.name).await;
            StepOutcome::Cancelled
        }
    };

    drain_pumps(pumps, &detach_tx, drain_timeout, &job.slug, &step.name).await;

    info!(
        slug = %job.slug,
        step = %step.name,
        state = ?run.state,
        outcome = ?outcome,
        "step finished"
    );
    outcome
}

async fn kill(child: &mut Child, slug: &Slug, step: &str) {
    if let Err(e) = child.kill().await {
        warn!(slug = %slug, step, error = %e, "failed to kill step process on cancellation");
    }
}

/// Copy one process stream into the publisher, line by line.
///
/// Stops at end of stream or when `detach` flips; either way the unterminated
/// remainder is published before returning.
async fn pump<R>(
    mut reader: R,
    slug: Slug,
    stream: LogStream,
    publisher: LogPublisher,
    mut detach: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    for line in framer.feed(&buf[..n]) {
                        publisher.publish(&slug, stream, line);
                    }
                }
                Err(e) => {
                    warn!(slug = %slug, %stream, error = %e, "reading process output failed");
                    break;
                }
            },
            _ = detach.changed() => {
                debug!(slug = %slug, %stream, "detaching from open output stream");
                break;
            }
        }
    }

    if let Some(rest) = framer.flush() {
        publisher.publish(&slug, stream, rest);
    }
    debug!(slug = %slug, %stream, "output pump finished");
}

/// Wait for both pumps to reach end of stream. A grandchild may keep a pipe
/// open after the step exited; past `timeout` the pumps are told to detach.
async fn drain_pumps(
    pumps: Vec<JoinHandle<()>>,
    detach: &watch::Sender<bool>,
    timeout: Duration,
    slug: &Slug,
    step: &str,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    for mut pump in pumps {
        if tokio::time::timeout_at(deadline, &mut pump).await.is_err() {
            warn!(slug = %slug, step, ?timeout, "output stream still open after process exit; detaching");
            detach.send_replace(true);
            let _ = pump.await;
        }
    }
}
