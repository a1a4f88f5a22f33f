// src/artifacts/store.rs

//! Durable object storage seam.
//!
//! The artifact publisher only needs a flat key/value `put`. Production
//! deployments plug in a cloud bucket; [`LocalObjectStore`] keeps objects on
//! the local filesystem under `{root}/{bucket}/{key}`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::debug;

use crate::errors::{BuildcastError, Result};

/// What the store reports back for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub etag: String,
}

pub type PutFuture<'a> = Pin<Box<dyn Future<Output = Result<PutReceipt>> + Send + 'a>>;

pub trait ObjectStore: Send + Sync {
    fn put(&self, key: String, body: Vec<u8>, content_type: &'static str) -> PutFuture<'_>;
}

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    bucket_dir: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            bucket_dir: root.as_ref().join(bucket),
        }
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    /// Map a key onto a path inside the bucket, refusing anything that could
    /// escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.bucket_dir.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(BuildcastError::StorageError(format!(
                    "invalid object key {key:?}"
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: String, body: Vec<u8>, content_type: &'static str) -> PutFuture<'_> {
        Box::pin(async move {
            let path = self.object_path(&key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &body).await?;

            let etag = blake3::hash(&body).to_hex().to_string();
            debug!(key = %key, content_type, bytes = body.len(), %etag, "object stored");
            Ok(PutReceipt { etag })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_under_bucket_and_returns_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "builds");

        let receipt = store
            .put("app/css/site.css".into(), b"body{}".to_vec(), "text/css")
            .await
            .unwrap();

        let stored = std::fs::read(dir.path().join("builds/app/css/site.css")).unwrap();
        assert_eq!(stored, b"body{}");
        assert_eq!(receipt.etag, blake3::hash(b"body{}").to_hex().to_string());
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "builds");

        for key in ["../x", "a//b", "a/./b", "/abs", "a/"] {
            let err = store.put(key.into(), Vec::new(), "text/plain").await;
            assert!(err.is_err(), "key {key:?} should be rejected");
        }
    }
}
