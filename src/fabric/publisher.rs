// src/fabric/publisher.rs

//! Fire-and-forget log publishing.
//!
//! `publish` only enqueues: a background forwarder hands records to the
//! [`Transport`] in enqueue order, so a slow or broken broker never stalls
//! the build. Transport errors are logged here and swallowed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::fabric::transport::{Transport, log_topic};
use crate::types::{LogRecord, LogStream, Slug};

struct Outgoing {
    topic: String,
    payload: String,
}

struct PublisherState {
    queue: Option<mpsc::UnboundedSender<Outgoing>>,
    sequences: HashMap<Slug, u64>,
}

struct PublisherInner {
    state: Mutex<PublisherState>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to the process-wide publisher.
#[derive(Clone)]
pub struct LogPublisher {
    inner: Arc<PublisherInner>,
}

impl LogPublisher {
    /// Start the publisher and its forwarder task on the current runtime.
    pub fn start(transport: Arc<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Outgoing>();
        let forwarder = tokio::spawn(forward(rx, transport));

        Self {
            inner: Arc::new(PublisherInner {
                state: Mutex::new(PublisherState {
                    queue: Some(tx),
                    sequences: HashMap::new(),
                }),
                forwarder: Mutex::new(Some(forwarder)),
            }),
        }
    }

    /// Publish one line for `slug`.
    ///
    /// Never blocks and never fails; after [`LogPublisher::shutdown`] lines
    /// are dropped.
    pub fn publish(&self, slug: &Slug, stream: LogStream, text: impl Into<String>) {
        let mut state = self.lock_state();
        let Some(queue) = state.queue.clone() else {
            debug!(slug = %slug, "publisher shut down; dropping log line");
            return;
        };

        // The sequence number and the queue position are taken under the
        // same lock, so sequence order is delivery order.
        let counter = state.sequences.entry(slug.clone()).or_insert(0);
        let record = LogRecord {
            slug: slug.clone(),
            stream,
            text: text.into(),
            sequence: *counter,
        };
        *counter += 1;

        let payload = match serde_json::to_string(&record) {
            Ok(p) => p,
            Err(e) => {
                warn!(slug = %slug, error = %e, "failed to encode log record; dropping");
                return;
            }
        };

        let outgoing = Outgoing {
            topic: log_topic(slug.as_str()),
            payload,
        };
        if queue.send(outgoing).is_err() {
            debug!(slug = %slug, "publisher forwarder gone; dropping log line");
        }
    }

    /// Shorthand for a synthetic status line.
    pub fn system(&self, slug: &Slug, text: impl Into<String>) {
        self.publish(slug, LogStream::System, text);
    }

    /// Forget the sequence counter of a finished job.
    pub fn retire(&self, slug: &Slug) {
        self.lock_state().sequences.remove(slug);
    }

    /// Stop accepting lines and wait up to `grace` for queued lines to reach
    /// the transport.
    pub async fn shutdown(&self, grace: Duration) {
        {
            let mut state = self.lock_state();
            state.queue = None;
        }

        let handle = match self.inner.forwarder.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => debug!("log publisher drained"),
            Err(_) => {
                warn!(?grace, "log publisher did not drain within grace period; aborting");
                handle.abort();
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PublisherState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn forward(mut rx: mpsc::UnboundedReceiver<Outgoing>, transport: Arc<dyn Transport>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = transport.publish(&msg.topic, msg.payload).await {
            warn!(topic = %msg.topic, error = %e, "log transport publish failed; line dropped");
        }
    }
    debug!("log publisher forwarder finished (queue closed)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::transport::{InProcessTransport, LOG_TOPIC_PATTERN};

    #[tokio::test]
    async fn sequences_are_per_slug_and_monotonic() {
        let transport = Arc::new(InProcessTransport::new(64));
        let mut sub = transport.subscribe_pattern(LOG_TOPIC_PATTERN).unwrap();
        let publisher = LogPublisher::start(transport.clone());

        let a = Slug::parse("a").unwrap();
        let b = Slug::parse("b").unwrap();
        publisher.system(&a, "a0");
        publisher.system(&b, "b0");
        publisher.system(&a, "a1");
        publisher.shutdown(Duration::from_secs(1)).await;
        transport.close();

        let mut seen = Vec::new();
        while let Some(msg) = sub.next().await {
            let record: LogRecord = serde_json::from_str(&msg.payload).unwrap();
            seen.push((record.slug.to_string(), record.text, record.sequence));
        }
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), "a0".to_string(), 0),
                ("b".to_string(), "b0".to_string(), 0),
                ("a".to_string(), "a1".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn publishing_after_shutdown_is_a_noop() {
        let transport = Arc::new(InProcessTransport::new(4));
        let publisher = LogPublisher::start(transport);
        publisher.shutdown(Duration::from_millis(100)).await;
        publisher.system(&Slug::parse("late").unwrap(), "ignored");
        publisher.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn broken_transport_does_not_surface_errors() {
        let transport = Arc::new(InProcessTransport::new(4));
        transport.close();
        let publisher = LogPublisher::start(transport);
        publisher.system(&Slug::parse("x").unwrap(), "lost");
        publisher.shutdown(Duration::from_secs(1)).await;
    }
}
