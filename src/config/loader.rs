// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::model::ConfigFile;
use crate::config::validate::validate_config;

/// Load a configuration file from a given path and return the raw `ConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML config from {:?}", path))?;

    Ok(config)
}

/// Load from `path` if it exists, otherwise fall back to the built-in
/// defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.exists() {
        load_from_path(path)
    } else {
        info!(path = ?path, "config file not found; using built-in defaults");
        Ok(ConfigFile::default())
    }
}

/// Override selected settings from the process environment.
///
/// `lookup` is `std::env::var(..).ok()` in production; it is called exactly
/// once per variable.
pub fn apply_env_overrides<F>(cfg: &mut ConfigFile, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(root) = lookup("BUILDCAST_STORAGE_ROOT") {
        cfg.storage.root = root;
    }
    if let Some(bucket) = lookup("BUILDCAST_BUCKET") {
        cfg.storage.bucket = bucket;
    }
    if let Some(listen) = lookup("BUILDCAST_LISTEN") {
        cfg.relay.listen = listen;
    }
}

/// Load, apply environment overrides and validate.
///
/// This is the recommended entry point for the rest of the application and
/// runs once at process start; nothing re-reads the config afterwards.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let mut config = load_or_default(&path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}
