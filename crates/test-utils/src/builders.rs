#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use buildcast::config::{ConfigFile, StepConfig};
use buildcast::types::{BuildJob, Slug, StepSpec};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with **no** build steps.
pub struct ConfigFileBuilder {
    config: ConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = ConfigFile::default();
        config.build.step.clear();
        Self { config }
    }

    pub fn with_step(mut self, name: &str, cmd: &str) -> Self {
        self.config.build.step.push(StepConfig {
            name: name.to_string(),
            cmd: cmd.to_string(),
            env: BTreeMap::new(),
        });
        self
    }

    pub fn with_output_dir(mut self, dir: &str) -> Self {
        self.config.build.output_dir = dir.to_string();
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.config.upload.exclude.push(pattern.to_string());
        self
    }

    pub fn fail_fast(mut self, val: bool) -> Self {
        self.config.upload.fail_fast = val;
        self
    }

    pub fn build(self) -> ConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `BuildJob` running in `working_dir`.
pub struct BuildJobBuilder {
    job: BuildJob,
}

impl BuildJobBuilder {
    pub fn new(slug: &str, working_dir: &Path) -> Self {
        Self {
            job: BuildJob {
                slug: Slug::parse(slug).expect("test slug must be valid"),
                steps: Vec::new(),
                working_dir: working_dir.to_path_buf(),
                output_dir: working_dir.join("dist"),
                env: BTreeMap::new(),
            },
        }
    }

    pub fn step(mut self, name: &str, cmd: &str) -> Self {
        self.job.steps.push(StepSpec::new(name, cmd));
        self
    }

    pub fn step_env(mut self, name: &str, cmd: &str, key: &str, value: &str) -> Self {
        let mut step = StepSpec::new(name, cmd);
        step.env.insert(key.to_string(), value.to_string());
        self.job.steps.push(step);
        self
    }

    pub fn output_dir(mut self, dir: &Path) -> Self {
        self.job.output_dir = dir.to_path_buf();
        self
    }

    pub fn build(self) -> BuildJob {
        self.job
    }
}
