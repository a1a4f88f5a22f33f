// src/deploy/mod.rs

//! Deployment trigger: turns a deploy request into a planned [`BuildJob`]
//! and hands it to a [`JobLauncher`].

pub mod launcher;
pub mod source;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::types::{BuildJob, Slug, StepSpec};

pub use launcher::{JobLauncher, LaunchFuture, LaunchedJob, LocalLauncher};
pub use source::{SourceLocation, shell_quote};

/// Name of the synthetic step that fetches a git source.
pub const CLONE_STEP: &str = "clone";

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub source: SourceLocation,
    /// Caller-chosen slug; generated when absent.
    pub slug: Option<String>,
}

pub struct DeploymentTrigger<L> {
    config: ConfigFile,
    launcher: L,
}

impl<L: JobLauncher> DeploymentTrigger<L> {
    pub fn new(config: ConfigFile, launcher: L) -> Self {
        Self { config, launcher }
    }

    /// Resolve the slug and plan the job without running anything.
    pub fn plan(&self, request: &DeployRequest) -> Result<BuildJob> {
        let slug = resolve_slug(request.slug.as_deref())?;
        plan_job(&self.config, slug, &request.source)
    }

    /// Plan, prepare the workspace and launch.
    pub async fn deploy(&self, request: DeployRequest) -> Result<LaunchedJob> {
        let job = self.plan(&request)?;
        if request.source.is_remote() {
            prepare_workspace(&job.working_dir).await?;
        }

        info!(slug = %job.slug, source = %request.source, "deploy accepted");
        let launched = self.launcher.launch(job).await?;
        Ok(launched)
    }
}

/// Validate a caller-supplied slug or generate a fresh one.
pub fn resolve_slug(requested: Option<&str>) -> Result<Slug> {
    match requested {
        Some(raw) => Ok(Slug::parse(raw.trim())?),
        None => Ok(Slug::generate()),
    }
}

/// Build the job description for `source` from the configured steps.
pub fn plan_job(cfg: &ConfigFile, slug: Slug, source: &SourceLocation) -> Result<BuildJob> {
    let configured = cfg.build.step.iter().map(|s| s.to_spec());

    let (working_dir, steps, env) = match source {
        SourceLocation::LocalDir(dir) => {
            if !dir.is_dir() {
                return Err(anyhow!("source directory {:?} does not exist", dir));
            }
            (dir.clone(), configured.collect::<Vec<_>>(), BTreeMap::new())
        }
        SourceLocation::GitRepo(url) => {
            let working_dir = PathBuf::from(&cfg.build.workspace_root).join(slug.as_str());
            let clone = StepSpec::new(
                CLONE_STEP,
                format!("git clone --depth 1 {} .", shell_quote(url)),
            );
            let steps = std::iter::once(clone).chain(configured).collect();
            let env = BTreeMap::from([("REPO_URL".to_string(), url.clone())]);
            (working_dir, steps, env)
        }
    };

    let output_dir = working_dir.join(&cfg.build.output_dir);
    debug!(slug = %slug, ?working_dir, ?output_dir, "planned build job");

    Ok(BuildJob {
        slug,
        steps,
        working_dir,
        output_dir,
        env,
    })
}

/// Give a git job an empty working directory.
async fn prepare_workspace(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        debug!(?dir, "clearing previous workspace");
        tokio::fs::remove_dir_all(dir)
            .await
            .with_context(|| format!("clearing workspace {:?}", dir))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating workspace {:?}", dir))?;
    Ok(())
}
