// src/engine/job.rs

//! One build job end to end: build steps, then artifact upload.

use std::time::Duration;

use tracing::{info, warn};

use crate::artifacts::{ArtifactPublisher, UploadReport};
use crate::engine::CancelSignal;
use crate::errors::BuildcastError;
use crate::exec::{BuildExecutor, BuildResult};
use crate::fabric::LogPublisher;
use crate::types::BuildJob;

/// Long-lived collaborators shared by every job of the process.
#[derive(Clone)]
pub struct JobContext {
    pub publisher: LogPublisher,
    pub artifacts: ArtifactPublisher,
    /// Bound on draining a step's output after exit or cancellation.
    pub drain_timeout: Duration,
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub build: BuildResult,
    /// `None` when the build failed or was cancelled, or the output directory
    /// was missing.
    pub upload: Option<UploadReport>,
    pub output_missing: bool,
}

impl JobReport {
    pub fn success(&self) -> bool {
        self.build.success
            && !self.output_missing
            && self.upload.as_ref().is_some_and(UploadReport::is_complete)
    }
}

/// Run `job` to completion and publish its status lines.
pub async fn run_job(ctx: &JobContext, job: BuildJob, mut cancel: CancelSignal) -> JobReport {
    let slug = job.slug.clone();
    ctx.publisher.system(&slug, "Starting build process...");

    let executor = BuildExecutor::new(ctx.publisher.clone(), ctx.drain_timeout);
    let build = executor.run(&job, &mut cancel).await;

    let mut report = JobReport {
        build,
        upload: None,
        output_missing: false,
    };

    if !report.build.success {
        finish(ctx, &job, &report);
        return report;
    }

    if cancel.is_cancelled() {
        ctx.publisher
            .system(&slug, "Build cancelled before upload");
        report.build.success = false;
        report.build.cancelled = true;
        finish(ctx, &job, &report);
        return report;
    }

    ctx.publisher.system(
        &slug,
        format!("Uploading {} to storage...", job.output_dir.display()),
    );
    match ctx.artifacts.upload(&job.output_dir, &slug, &cancel).await {
        Ok(upload) => {
            if upload.is_complete() {
                ctx.publisher.system(&slug, "Upload completed successfully!");
            } else if upload.cancelled {
                ctx.publisher.system(&slug, "Upload cancelled");
            } else {
                ctx.publisher.system(&slug, "Upload finished with errors");
            }
            report.upload = Some(upload);
        }
        Err(BuildcastError::OutputMissing(dir)) => {
            ctx.publisher.system(
                &slug,
                format!("Error: output directory '{}' not found after build", dir.display()),
            );
            report.output_missing = true;
        }
        Err(e) => {
            warn!(slug = %slug, error = %e, "artifact upload could not start");
            ctx.publisher
                .system(&slug, format!("Upload failed: {e}"));
            report.upload = Some(UploadReport {
                aborted: true,
                ..UploadReport::default()
            });
        }
    }

    finish(ctx, &job, &report);
    report
}

fn finish(ctx: &JobContext, job: &BuildJob, report: &JobReport) {
    let success = report.success();
    info!(
        slug = %job.slug,
        success,
        failed_step = ?report.build.failed_step,
        exit_code = ?report.build.exit_code,
        cancelled = report.build.cancelled,
        "job finished"
    );
    let line = if success {
        "Deployment finished successfully".to_string()
    } else {
        "Deployment failed".to_string()
    };
    ctx.publisher.system(&job.slug, line);
    ctx.publisher.retire(&job.slug);
}
