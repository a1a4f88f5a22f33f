use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use buildcast::artifacts::{ObjectStore, PutFuture, PutReceipt};
use buildcast::errors::BuildcastError;
use buildcast::fabric::transport::{PublishFuture, TopicSubscription, Transport};
use buildcast::fabric::InProcessTransport;

/// One recorded `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
}

/// An object store that:
/// - records every successful put in call order
/// - fails puts whose key is in `fail_keys`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<Vec<StoredObject>>>,
    attempts: Arc<Mutex<Vec<String>>>,
    fail_keys: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().into_iter().map(|o| o.key).collect()
    }

    /// Every key `put` was called with, including failed ones.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, key: String, body: Vec<u8>, content_type: &'static str) -> PutFuture<'_> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(key.clone());
            if self.fail_keys.lock().unwrap().contains(&key) {
                return Err(BuildcastError::StorageError(format!("injected failure for {key}")));
            }
            let etag = format!("{}", body.len());
            self.objects.lock().unwrap().push(StoredObject {
                key,
                body,
                content_type: content_type.to_string(),
            });
            Ok(PutReceipt { etag })
        })
    }
}

/// Wraps an [`InProcessTransport`] but fails every publish while `broken`
/// is set.
pub struct FlakyTransport {
    inner: InProcessTransport,
    broken: Mutex<bool>,
}

impl FlakyTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: InProcessTransport::new(capacity),
            broken: Mutex::new(false),
        }
    }

    pub fn set_broken(&self, broken: bool) {
        *self.broken.lock().unwrap() = broken;
    }
}

impl Transport for FlakyTransport {
    fn publish<'a>(&'a self, topic: &'a str, payload: String) -> PublishFuture<'a> {
        let broken = *self.broken.lock().unwrap();
        Box::pin(async move {
            if broken {
                return Err(BuildcastError::TransportError("broker unreachable".into()));
            }
            self.inner.publish(topic, payload).await
        })
    }

    fn subscribe_pattern(&self, pattern: &str) -> buildcast::errors::Result<TopicSubscription> {
        self.inner.subscribe_pattern(pattern)
    }

    fn close(&self) {
        self.inner.close();
    }
}
