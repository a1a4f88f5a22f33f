// src/fabric/mod.rs

//! Log distribution fabric.
//!
//! ```text
//! executor / artifacts ──► LogPublisher ──► Transport (logs:{slug})
//!                                                │  pattern subscription logs:*
//!                                                ▼
//!                      observers ◄── SubscriptionRegistry ◄── LogDistributor
//! ```
//!
//! - [`transport`] defines the broker seam and the in-process broker.
//! - [`publisher`] is the non-blocking producer side.
//! - [`registry`] tracks live observers per slug.
//! - [`distributor`] routes transport messages into the registry.
//! - [`observer`] exposes the registry over TCP and implements the client.

pub mod distributor;
pub mod observer;
pub mod publisher;
pub mod registry;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::RelaySection;

pub use distributor::LogDistributor;
pub use observer::ObserverServer;
pub use publisher::LogPublisher;
pub use registry::{ConnectionId, FanoutStats, ObserverConnection, SubscriptionRegistry};
pub use transport::{InProcessTransport, TopicMessage, TopicSubscription, Transport};

/// Process-wide log plumbing, created once at start and shut down
/// explicitly.
pub struct LogFabric {
    transport: Arc<dyn Transport>,
    publisher: LogPublisher,
    registry: Arc<SubscriptionRegistry>,
    distributor: LogDistributor,
    observers: Option<ObserverServer>,
    observer_buffer: usize,
}

impl LogFabric {
    /// Wire publisher, distributor and registry around `transport`.
    ///
    /// The observer listener is not started; see [`LogFabric::listen`].
    pub fn start(relay: &RelaySection, transport: Arc<dyn Transport>) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let distributor = LogDistributor::spawn(transport.as_ref(), Arc::clone(&registry))?;
        let publisher = LogPublisher::start(Arc::clone(&transport));

        Ok(Self {
            transport,
            publisher,
            registry,
            distributor,
            observers: None,
            observer_buffer: relay.observer_buffer,
        })
    }

    /// Start accepting TCP observers on `addr`.
    pub async fn listen(&mut self, addr: &str) -> Result<std::net::SocketAddr> {
        let server =
            ObserverServer::bind(addr, Arc::clone(&self.registry), self.observer_buffer).await?;
        let local = server.local_addr();
        self.observers = Some(server);
        Ok(local)
    }

    pub fn publisher(&self) -> &LogPublisher {
        &self.publisher
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Drain and tear down, each stage bounded by `grace`:
    /// queued lines reach the transport, the transport closes, the
    /// distributor delivers what it already received, every observer
    /// connection is closed, and connection tasks get to write out their
    /// queues.
    pub async fn shutdown(self, grace: Duration) {
        info!(?grace, "shutting down log fabric");
        self.publisher.shutdown(grace).await;
        self.transport.close();
        self.distributor.shutdown(grace).await;
        if let Some(server) = &self.observers {
            server.stop_accepting();
        }
        let closed = self.registry.close_all();
        if let Some(server) = self.observers {
            server.drain(grace).await;
        }
        info!(closed_observers = closed, "log fabric stopped");
    }
}
