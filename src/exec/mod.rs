// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for running the build steps with
//! `tokio::process::Command` and turning their output into log lines.
//!
//! - [`framer`] reassembles complete lines from raw stream chunks.
//! - [`step`] supervises a single step process and pumps its stdout/stderr.
//! - [`executor`] runs a job's steps in order and reports one terminal
//!   [`BuildResult`].

pub mod executor;
pub mod framer;
pub mod step;

pub use executor::{BuildExecutor, BuildResult};
pub use framer::LineFramer;
pub use step::{StepOutcome, StepState};
