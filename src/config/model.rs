// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::StepSpec;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [build]
/// output_dir = "dist"
///
/// [[build.step]]
/// name = "install"
/// cmd = "npm ci"
///
/// [[build.step]]
/// name = "build"
/// cmd = "npm run build"
/// env = { NODE_ENV = "production" }
///
/// [upload]
/// fail_fast = false
/// exclude = ["**/*.map"]
///
/// [storage]
/// root = ".buildcast/artifacts"
/// bucket = "builds"
///
/// [relay]
/// listen = "127.0.0.1:9000"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub upload: UploadSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub relay: RelaySection,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Ordered build steps from `[[build.step]]`.
    #[serde(default = "default_steps")]
    pub step: Vec<StepConfig>,

    /// Directory (relative to the working directory) that is uploaded after
    /// a successful build.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Where git sources are cloned, one sub-directory per slug.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
}

fn default_steps() -> Vec<StepConfig> {
    vec![
        StepConfig {
            name: "install".to_string(),
            cmd: "npm ci".to_string(),
            env: BTreeMap::new(),
        },
        StepConfig {
            name: "build".to_string(),
            cmd: "npm run build".to_string(),
            env: BTreeMap::new(),
        },
    ]
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_workspace_root() -> String {
    ".buildcast/workspaces".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            step: default_steps(),
            output_dir: default_output_dir(),
            workspace_root: default_workspace_root(),
        }
    }
}

/// `[[build.step]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub name: String,

    /// Shell command, run with `sh -c` (or `cmd /C` on Windows).
    pub cmd: String,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl StepConfig {
    pub fn to_spec(&self) -> StepSpec {
        StepSpec {
            name: self.name.clone(),
            cmd: self.cmd.clone(),
            env: self.env.clone(),
        }
    }
}

/// `[upload]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UploadSection {
    /// Stop at the first failed upload instead of attempting every file.
    #[serde(default)]
    pub fail_fast: bool,

    /// Glob patterns (relative to the output directory) that are never
    /// uploaded.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_root")]
    pub root: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_storage_root() -> String {
    ".buildcast/artifacts".to_string()
}

fn default_bucket() -> String {
    "builds".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            bucket: default_bucket(),
        }
    }
}

/// `[relay]` section: log fabric and observer listener.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Per-observer queue length; lines beyond it are dropped for that
    /// observer only.
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,

    #[serde(default = "default_transport_capacity")]
    pub transport_capacity: usize,

    /// Upper bound for draining logs on shutdown or cancellation.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_listen() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_observer_buffer() -> usize {
    1024
}

fn default_transport_capacity() -> usize {
    4096
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

impl RelaySection {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            observer_buffer: default_observer_buffer(),
            transport_capacity: default_transport_capacity(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}
