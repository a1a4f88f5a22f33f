// src/exec/executor.rs

//! Sequential build executor.

use std::time::Duration;

use tracing::{info, warn};

use crate::engine::CancelSignal;
use crate::exec::step::{StepOutcome, run_step};
use crate::fabric::LogPublisher;
use crate::types::BuildJob;

/// Terminal result of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub success: bool,
    pub failed_step: Option<String>,
    pub exit_code: Option<i32>,
    pub cancelled: bool,
}

impl BuildResult {
    fn succeeded() -> Self {
        Self {
            success: true,
            failed_step: None,
            exit_code: None,
            cancelled: false,
        }
    }

    fn failed(step: &str, exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            failed_step: Some(step.to_string()),
            exit_code,
            cancelled: false,
        }
    }

    fn cancelled(step: &str) -> Self {
        Self {
            cancelled: true,
            ..Self::failed(step, None)
        }
    }
}

/// Runs a job's steps in order and stops at the first failure.
///
/// Status lines go out on the system stream; nothing is retried.
#[derive(Clone)]
pub struct BuildExecutor {
    publisher: LogPublisher,
    drain_timeout: Duration,
}

impl BuildExecutor {
    pub fn new(publisher: LogPublisher, drain_timeout: Duration) -> Self {
        Self {
            publisher,
            drain_timeout,
        }
    }

    pub async fn run(&self, job: &BuildJob, cancel: &mut CancelSignal) -> BuildResult {
        let slug = &job.slug;
        info!(
            slug = %slug,
            steps = job.steps.len(),
            working_dir = ?job.working_dir,
            "build started"
        );

        for step in job.steps.iter() {
            if cancel.is_cancelled() {
                self.publisher
                    .system(slug, format!("Build cancelled before step '{}'", step.name));
                return BuildResult::cancelled(&step.name);
            }

            self.publisher
                .system(slug, format!("==> [{}] {}", step.name, step.cmd));

            let outcome = run_step(job, step, &self.publisher, cancel, self.drain_timeout).await;

            match outcome {
                StepOutcome::Succeeded => {
                    self.publisher
                        .system(slug, format!("Step '{}' completed", step.name));
                }
                StepOutcome::Failed { code } => {
                    warn!(slug = %slug, step = %step.name, exit_code = code, "build step failed");
                    self.publisher.system(
                        slug,
                        format!("Build process failed: step '{}' exited with code {code}", step.name),
                    );
                    return BuildResult::failed(&step.name, Some(code));
                }
                StepOutcome::SpawnFailed { message } => {
                    warn!(slug = %slug, step = %step.name, error = %message, "build step could not start");
                    self.publisher
                        .system(slug, format!("Build process failed: {message}"));
                    return BuildResult::failed(&step.name, None);
                }
                StepOutcome::Cancelled => {
                    self.publisher
                        .system(slug, format!("Build cancelled during step '{}'", step.name));
                    return BuildResult::cancelled(&step.name);
                }
            }
        }

        info!(slug = %slug, "build succeeded");
        self.publisher.system(slug, "Build completed successfully.");
        BuildResult::succeeded()
    }
}
