// src/config/mod.rs

//! Configuration loading and validation for buildcast.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply environment overrides once
//!   (`loader.rs`).
//! - Validate basic invariants like step naming and glob syntax
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, load_and_validate, load_from_path, load_or_default};
pub use model::{
    BuildSection, ConfigFile, RelaySection, StepConfig, StorageSection, UploadSection,
};
pub use validate::validate_config;
