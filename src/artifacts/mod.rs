// src/artifacts/mod.rs

//! Artifact publishing: walk the build output and persist every file under a
//! slug-prefixed key.

pub mod content_type;
pub mod publisher;
pub mod store;

pub use content_type::content_type_for;
pub use publisher::{ArtifactPublisher, UploadFailure, UploadOptions, UploadReport};
pub use store::{LocalObjectStore, ObjectStore, PutFuture, PutReceipt};
