// src/deploy/launcher.rs

//! Seam to whatever provisions compute for a build job.
//!
//! In production this is a container/task launcher; the core only needs job
//! acceptance. [`LocalLauncher`] runs the job as a Tokio task in this
//! process, which is what `buildcast deploy` uses.

use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinHandle;
use tracing::info;

use crate::engine::{CancelSignal, JobContext, JobReport, run_job};
use crate::errors::Result;
use crate::types::{BuildJob, Slug};

/// An accepted job.
#[derive(Debug)]
pub struct LaunchedJob {
    pub slug: Slug,
    /// Present when the job runs in this process.
    pub handle: Option<JoinHandle<JobReport>>,
}

pub type LaunchFuture<'a> = Pin<Box<dyn Future<Output = Result<LaunchedJob>> + Send + 'a>>;

pub trait JobLauncher: Send + Sync {
    fn launch(&self, job: BuildJob) -> LaunchFuture<'_>;
}

pub struct LocalLauncher {
    ctx: JobContext,
    cancel: CancelSignal,
}

impl LocalLauncher {
    pub fn new(ctx: JobContext, cancel: CancelSignal) -> Self {
        Self { ctx, cancel }
    }
}

impl JobLauncher for LocalLauncher {
    fn launch(&self, job: BuildJob) -> LaunchFuture<'_> {
        let ctx = self.ctx.clone();
        let cancel = self.cancel.clone();

        Box::pin(async move {
            let slug = job.slug.clone();
            info!(slug = %slug, working_dir = ?job.working_dir, "launching local build job");
            let handle = tokio::spawn(async move { run_job(&ctx, job, cancel).await });
            Ok(LaunchedJob {
                slug,
                handle: Some(handle),
            })
        })
    }
}
