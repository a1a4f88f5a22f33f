// src/fabric/transport.rs

//! Pub/sub transport between log producers and the distributor.
//!
//! The transport is an at-most-once broadcast: no acknowledgements, no
//! replay, no backpressure towards the publisher. [`InProcessTransport`] is the
//! implementation used by `buildcast deploy`; other brokers can be plugged in
//! by implementing [`Transport`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use globset::{Glob, GlobMatcher};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::errors::{BuildcastError, Result};

/// Topic prefix shared by every per-slug log topic.
pub const LOG_TOPIC_PREFIX: &str = "logs:";

/// Pattern matching every log topic.
pub const LOG_TOPIC_PATTERN: &str = "logs:*";

/// Topic name for a slug's log stream.
pub fn log_topic(slug: &str) -> String {
    format!("{LOG_TOPIC_PREFIX}{slug}")
}

/// A message as seen by pattern subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    pub topic: String,
    pub payload: String,
}

pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting the broker.
pub trait Transport: Send + Sync {
    /// Broadcast `payload` on `topic`. Finding no subscriber is not an error.
    fn publish<'a>(&'a self, topic: &'a str, payload: String) -> PublishFuture<'a>;

    /// Subscribe to every topic matching the glob `pattern`.
    ///
    /// Only messages published after this call are observed.
    fn subscribe_pattern(&self, pattern: &str) -> Result<TopicSubscription>;

    /// Stop accepting publishes. Subscribers drain what they already
    /// received and then see end of stream.
    fn close(&self);
}

/// Lazy, non-restartable sequence of messages matching one pattern.
pub struct TopicSubscription {
    rx: broadcast::Receiver<TopicMessage>,
    matcher: GlobMatcher,
}

impl TopicSubscription {
    pub fn new(rx: broadcast::Receiver<TopicMessage>, pattern: &str) -> Result<Self> {
        let matcher = Glob::new(pattern)
            .map_err(|e| {
                BuildcastError::TransportError(format!("invalid topic pattern {pattern:?}: {e}"))
            })?
            .compile_matcher();
        Ok(Self { rx, matcher })
    }

    /// Next matching message, or `None` once the transport is closed.
    ///
    /// A lagging subscriber skips what it missed.
    pub async fn next(&mut self) -> Option<TopicMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if self.matcher.is_match(&msg.topic) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "topic subscriber lagged; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Single-process broker backed by a bounded `tokio::sync::broadcast` ring.
#[derive(Debug)]
pub struct InProcessTransport {
    tx: Mutex<Option<broadcast::Sender<TopicMessage>>>,
}

impl InProcessTransport {
    /// Minimum capacity is 1 (clamped).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn sender(&self) -> Option<broadcast::Sender<TopicMessage>> {
        match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Transport for InProcessTransport {
    fn publish<'a>(&'a self, topic: &'a str, payload: String) -> PublishFuture<'a> {
        Box::pin(async move {
            let tx = self.sender().ok_or_else(|| {
                BuildcastError::TransportError("transport is closed".to_string())
            })?;

            let msg = TopicMessage {
                topic: topic.to_string(),
                payload,
            };
            if tx.send(msg).is_err() {
                debug!(topic, "no subscribers for topic; message dropped");
            }
            Ok(())
        })
    }

    fn subscribe_pattern(&self, pattern: &str) -> Result<TopicSubscription> {
        let tx = self.sender().ok_or_else(|| {
            BuildcastError::TransportError("transport is closed".to_string())
        })?;
        TopicSubscription::new(tx.subscribe(), pattern)
    }

    fn close(&self) {
        let taken = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if taken.is_some() {
            debug!("in-process transport closed");
        }
    }
}
