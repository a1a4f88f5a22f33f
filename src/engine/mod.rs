// src/engine/mod.rs

//! Job orchestration.
//!
//! - [`cancel`] carries Ctrl-C / teardown requests into running jobs.
//! - [`signals`] turns SIGINT / SIGTERM into such a request.
//! - [`job`] runs the build executor and then the artifact publisher, and
//!   folds both into one [`JobReport`].

pub mod cancel;
pub mod job;
pub mod signals;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use job::{JobContext, JobReport, run_job};
pub use signals::ShutdownSignals;
