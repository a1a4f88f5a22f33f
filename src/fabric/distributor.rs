// src/fabric/distributor.rs

//! Bridge from the transport's `logs:*` topics to the subscription registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fabric::registry::SubscriptionRegistry;
use crate::fabric::transport::{LOG_TOPIC_PATTERN, LOG_TOPIC_PREFIX, TopicMessage, Transport};
use crate::types::{LogRecord, Slug};

/// Extract the slug from a `logs:{slug}` topic name.
pub fn slug_from_topic(topic: &str) -> Option<Slug> {
    let raw = topic.strip_prefix(LOG_TOPIC_PREFIX)?;
    Slug::parse(raw).ok()
}

/// Handle to the running distributor loop.
///
/// - `cancel` stops the loop immediately.
/// - `handle` is the Tokio task running the loop; it also ends on its own once
///   the transport is closed and drained.
pub struct LogDistributor {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl LogDistributor {
    /// Subscribe to every log topic and start forwarding into `registry`.
    ///
    /// The subscription is established before this returns, so anything
    /// published afterwards is seen.
    pub fn spawn(transport: &dyn Transport, registry: Arc<SubscriptionRegistry>) -> Result<Self> {
        let mut subscription = transport.subscribe_pattern(LOG_TOPIC_PATTERN)?;
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            info!(pattern = LOG_TOPIC_PATTERN, "log distributor started");
            loop {
                tokio::select! {
                    msg = subscription.next() => match msg {
                        Some(msg) => dispatch(&registry, msg),
                        None => break,
                    },
                    _ = &mut cancel_rx => {
                        debug!("log distributor cancelled");
                        break;
                    }
                }
            }
            info!("log distributor finished");
        });

        Ok(Self {
            cancel: Some(cancel_tx),
            handle,
        })
    }

    /// Wait up to `grace` for the loop to drain a closed transport, then stop
    /// it.
    pub async fn shutdown(mut self, grace: Duration) {
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(_) => {}
            Err(_) => {
                warn!(?grace, "log distributor still running after grace period; stopping");
                if let Some(cancel) = self.cancel.take() {
                    let _ = cancel.send(());
                }
                let _ = self.handle.await;
            }
        }
    }
}

fn dispatch(registry: &SubscriptionRegistry, msg: TopicMessage) {
    let Some(slug) = slug_from_topic(&msg.topic) else {
        warn!(topic = %msg.topic, "malformed log topic; skipping message");
        return;
    };

    let record: LogRecord = match serde_json::from_str(&msg.payload) {
        Ok(r) => r,
        Err(e) => {
            warn!(topic = %msg.topic, error = %e, "undecodable log payload; skipping message");
            return;
        }
    };

    if record.slug != slug {
        warn!(
            topic = %msg.topic,
            record_slug = %record.slug,
            "log record slug does not match its topic; skipping message"
        );
        return;
    }

    let stats = registry.fanout(&slug, &record);
    debug!(slug = %slug, sequence = record.sequence, ?stats, "log record distributed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_parsed_from_topic() {
        assert_eq!(slug_from_topic("logs:blue-fox").unwrap().as_str(), "blue-fox");
        assert!(slug_from_topic("logs:").is_none());
        assert!(slug_from_topic("logs:a:b").is_none());
        assert!(slug_from_topic("metrics:a").is_none());
        assert!(slug_from_topic("logs").is_none());
    }
}
