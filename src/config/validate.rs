// src/config/validate.rs

use std::collections::HashSet;
use std::path::{Component, Path};

use anyhow::{Context, Result, anyhow};
use globset::Glob;

use crate::config::model::ConfigFile;

/// Run basic semantic validation against a loaded configuration.
///
/// This checks:
/// - there is at least one build step
/// - step names are non-empty and unique, commands are non-empty
/// - `output_dir` is a non-empty relative path without `..`
/// - the storage bucket is a single path segment
/// - relay buffers and grace period are non-zero
/// - every `upload.exclude` pattern is a valid glob
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    validate_steps(cfg)?;
    validate_output_dir(cfg)?;
    validate_storage(cfg)?;
    validate_relay(cfg)?;
    validate_excludes(cfg)?;
    Ok(())
}

fn validate_steps(cfg: &ConfigFile) -> Result<()> {
    if cfg.build.step.is_empty() {
        return Err(anyhow!(
            "config must contain at least one [[build.step]] entry"
        ));
    }

    let mut seen = HashSet::new();
    for step in cfg.build.step.iter() {
        if step.name.trim().is_empty() {
            return Err(anyhow!("build step names must not be empty"));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(anyhow!("duplicate build step name '{}'", step.name));
        }
        if step.cmd.trim().is_empty() {
            return Err(anyhow!("build step '{}' has an empty `cmd`", step.name));
        }
    }
    Ok(())
}

fn validate_output_dir(cfg: &ConfigFile) -> Result<()> {
    let dir = Path::new(&cfg.build.output_dir);
    if cfg.build.output_dir.trim().is_empty() {
        return Err(anyhow!("[build].output_dir must not be empty"));
    }
    if dir.is_absolute() {
        return Err(anyhow!(
            "[build].output_dir must be relative to the working directory (got {:?})",
            dir
        ));
    }
    if dir.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(anyhow!(
            "[build].output_dir must not contain `..` (got {:?})",
            dir
        ));
    }
    Ok(())
}

fn validate_storage(cfg: &ConfigFile) -> Result<()> {
    let bucket = cfg.storage.bucket.trim();
    if bucket.is_empty() || bucket.contains('/') || bucket.contains('\\') || bucket == ".." {
        return Err(anyhow!(
            "[storage].bucket must be a single non-empty name (got {:?})",
            cfg.storage.bucket
        ));
    }
    Ok(())
}

fn validate_relay(cfg: &ConfigFile) -> Result<()> {
    if cfg.relay.observer_buffer == 0 {
        return Err(anyhow!("[relay].observer_buffer must be >= 1 (got 0)"));
    }
    if cfg.relay.transport_capacity == 0 {
        return Err(anyhow!("[relay].transport_capacity must be >= 1 (got 0)"));
    }
    if cfg.relay.shutdown_grace_ms == 0 {
        return Err(anyhow!("[relay].shutdown_grace_ms must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_excludes(cfg: &ConfigFile) -> Result<()> {
    for pattern in cfg.upload.exclude.iter() {
        Glob::new(pattern)
            .with_context(|| format!("invalid [upload].exclude pattern {:?}", pattern))?;
    }
    Ok(())
}
