// src/fabric/registry.rs

//! Live observer connections, grouped by slug.
//!
//! ## Rules
//! - A slug entry exists only while it has at least one connection.
//! - `join`, `leave` and `fanout` share one critical section, so a fanout
//!   sees every connection whose `join` returned before it started and never
//!   one that is half removed.
//! - Delivery uses `try_send`: a full observer queue drops that line for that
//!   observer only, a closed one is removed on the spot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::{LogRecord, Slug};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one observer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Registry side of an observer: the slug it is bound to and its queue.
#[derive(Debug)]
pub struct ObserverConnection {
    id: ConnectionId,
    slug: Slug,
    tx: mpsc::Sender<LogRecord>,
}

impl ObserverConnection {
    /// Create a connection for `slug` and the receiver its owner reads from.
    pub fn channel(slug: Slug, buffer: usize) -> (Self, mpsc::Receiver<LogRecord>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        (Self { id, slug, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// Outcome of a single fanout call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    pub delivered: usize,
    /// Observer queue was full; the line was skipped for that observer.
    pub dropped: usize,
    /// Observer had already gone away and was removed.
    pub pruned: usize,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    slugs: Mutex<HashMap<Slug, HashMap<ConnectionId, ObserverConnection>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` under its slug, creating the entry if absent.
    pub fn join(&self, connection: ObserverConnection) -> ConnectionId {
        let id = connection.id;
        let slug = connection.slug.clone();
        let mut slugs = self.lock();
        let observers = slugs.entry(slug.clone()).or_default();
        observers.insert(id, connection);
        info!(slug = %slug, connection = %id, observers = observers.len(), "observer joined");
        id
    }

    /// Remove a connection; drops the slug entry once it is empty.
    ///
    /// Returns `false` if the connection was not registered.
    pub fn leave(&self, slug: &Slug, id: ConnectionId) -> bool {
        let mut slugs = self.lock();
        let Some(observers) = slugs.get_mut(slug) else {
            return false;
        };
        let removed = observers.remove(&id).is_some();
        let remaining = observers.len();
        if remaining == 0 {
            slugs.remove(slug);
        }
        if removed {
            info!(slug = %slug, connection = %id, remaining, "observer left");
        }
        removed
    }

    /// Deliver `record` to every observer currently registered for `slug`.
    pub fn fanout(&self, slug: &Slug, record: &LogRecord) -> FanoutStats {
        let mut stats = FanoutStats::default();
        let mut slugs = self.lock();
        let Some(observers) = slugs.get_mut(slug) else {
            debug!(slug = %slug, "no observers for slug; record discarded");
            return stats;
        };

        let mut closed = Vec::new();
        for (id, conn) in observers.iter() {
            match conn.tx.try_send(record.clone()) {
                Ok(()) => stats.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    stats.dropped += 1;
                    warn!(slug = %slug, connection = %id, "observer queue full; line dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            observers.remove(&id);
            stats.pruned += 1;
            debug!(slug = %slug, connection = %id, "pruned closed observer during fanout");
        }
        if observers.is_empty() {
            slugs.remove(slug);
        }

        stats
    }

    /// Drop every connection; their receivers see end of stream.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        drained.iter().map(|(_, observers)| observers.len()).sum()
    }

    pub fn slug_count(&self) -> usize {
        self.lock().len()
    }

    pub fn connection_count(&self, slug: &Slug) -> usize {
        self.lock().get(slug).map_or(0, HashMap::len)
    }

    pub fn is_registered(&self, slug: &Slug) -> bool {
        self.lock().contains_key(slug)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Slug, HashMap<ConnectionId, ObserverConnection>>> {
        match self.slugs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
