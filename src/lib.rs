// src/lib.rs

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fabric;
pub mod logging;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactPublisher, LocalObjectStore, ObjectStore, UploadOptions};
use crate::cli::{CliArgs, Command};
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::deploy::{DeployRequest, DeploymentTrigger, LocalLauncher, SourceLocation};
use crate::engine::{JobContext, ShutdownSignals, cancel_pair};
use crate::fabric::{InProcessTransport, LogFabric, Transport};
use crate::types::{BuildJob, Slug};

/// High-level entry point used by `main.rs`.
///
/// Returns whether the command succeeded; a failed build is `Ok(false)`, not
/// an error.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_and_validate(&args.config)?;

    match args.command {
        Command::Deploy {
            source,
            slug,
            dry_run,
        } => {
            let source: SourceLocation = source.parse()?;
            let request = DeployRequest { source, slug };
            if dry_run {
                let slug = deploy::resolve_slug(request.slug.as_deref())?;
                let job = deploy::plan_job(&cfg, slug, &request.source)?;
                print_dry_run(&cfg, &job);
                return Ok(true);
            }
            run_deploy(cfg, request).await
        }
        Command::Watch { slug, addr } => {
            let slug = Slug::parse(slug.trim())?;
            let addr = addr.unwrap_or_else(|| cfg.relay.listen.clone());
            fabric::observer::watch(&addr, &slug, |line| println!("{line}")).await?;
            Ok(true)
        }
    }
}

/// Local deploy: wires together
/// - the log fabric and observer listener
/// - the artifact store
/// - the local launcher
/// - termination signal handling
async fn run_deploy(cfg: ConfigFile, request: DeployRequest) -> Result<bool> {
    let grace = cfg.relay.shutdown_grace();
    let mut signals = ShutdownSignals::register().context("installing signal handlers")?;

    let transport: Arc<dyn Transport> =
        Arc::new(InProcessTransport::new(cfg.relay.transport_capacity));
    let mut fabric = LogFabric::start(&cfg.relay, transport)?;
    let listen_addr = match fabric.listen(&cfg.relay.listen).await {
        Ok(addr) => addr,
        Err(e) => {
            fabric.shutdown(grace).await;
            return Err(e);
        }
    };

    let store: Arc<dyn ObjectStore> =
        Arc::new(LocalObjectStore::new(&cfg.storage.root, &cfg.storage.bucket));
    let artifacts = ArtifactPublisher::new(
        store,
        fabric.publisher().clone(),
        UploadOptions::from_config(&cfg.upload)?,
    );
    let ctx = JobContext {
        publisher: fabric.publisher().clone(),
        artifacts,
        drain_timeout: grace,
    };

    // SIGINT / SIGTERM → cancel the running job; the job flushes and
    // reports itself before the fabric drains.
    let (cancel_handle, cancel) = cancel_pair();
    let signal_task = tokio::spawn(async move {
        let name = signals.recv().await;
        warn!(signal = name, "termination signal received; cancelling build");
        cancel_handle.cancel();
    });

    let trigger = DeploymentTrigger::new(cfg, LocalLauncher::new(ctx, cancel));
    let outcome = match trigger.deploy(request).await {
        Ok(launched) => {
            println!("slug: {}", launched.slug);
            println!("watch: buildcast watch --slug {} --addr {}", launched.slug, listen_addr);
            match launched.handle {
                Some(handle) => handle.await.context("build job task failed"),
                None => Err(anyhow!("launcher did not return a local job handle")),
            }
        }
        Err(e) => Err(e),
    };

    signal_task.abort();
    fabric.shutdown(grace).await;

    let report = outcome?;
    info!(success = report.success(), "deploy finished");
    Ok(report.success())
}

/// Simple dry-run output: print the planned job.
fn print_dry_run(cfg: &ConfigFile, job: &BuildJob) {
    println!("buildcast dry-run");
    println!("  slug = {}", job.slug);
    println!("  working_dir = {}", job.working_dir.display());
    println!("  output_dir = {}", job.output_dir.display());
    println!(
        "  storage = {}/{}/{}/",
        cfg.storage.root, cfg.storage.bucket, job.slug
    );
    println!("  upload.fail_fast = {}", cfg.upload.fail_fast);
    if !cfg.upload.exclude.is_empty() {
        println!("  upload.exclude = {:?}", cfg.upload.exclude);
    }
    for (key, value) in job.env.iter() {
        println!("  env {key} = {value}");
    }
    println!();

    println!("steps ({}):", job.steps.len());
    for step in job.steps.iter() {
        println!("  - {}", step.name);
        println!("      cmd: {}", step.cmd);
        if !step.env.is_empty() {
            println!("      env: {:?}", step.env);
        }
    }

    debug!("dry-run complete (no execution)");
}
