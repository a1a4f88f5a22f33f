use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use buildcast::config::RelaySection;
use buildcast::fabric::{InProcessTransport, LogFabric, ObserverConnection, SubscriptionRegistry, Transport};
use buildcast::types::{LogRecord, LogStream, Slug};

/// Generous enough that no test line is ever dropped.
const CAPTURE_BUFFER: usize = 64 * 1024;

pub const TEST_GRACE: Duration = Duration::from_secs(5);

/// Start a fabric over a fresh in-process transport.
pub fn start_fabric() -> LogFabric {
    let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new(CAPTURE_BUFFER));
    start_fabric_with(transport)
}

pub fn start_fabric_with(transport: Arc<dyn Transport>) -> LogFabric {
    LogFabric::start(&RelaySection::default(), transport).expect("fabric starts")
}

/// An in-memory observer that records everything delivered for one slug.
pub struct Capture {
    rx: mpsc::Receiver<LogRecord>,
}

impl Capture {
    pub fn attach(registry: &SubscriptionRegistry, slug: &Slug) -> Self {
        let (conn, rx) = ObserverConnection::channel(slug.clone(), CAPTURE_BUFFER);
        registry.join(conn);
        Self { rx }
    }

    /// Collect until the registry drops the connection (fabric shutdown).
    pub async fn drain(mut self) -> Vec<LogRecord> {
        let mut out = Vec::new();
        while let Some(record) = self.rx.recv().await {
            out.push(record);
        }
        out
    }

    /// Wait for the next delivered record.
    pub async fn next(&mut self) -> Option<LogRecord> {
        self.rx.recv().await
    }
}

/// Texts of `records` from `stream`, in delivery order.
pub fn texts(records: &[LogRecord], stream: LogStream) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.stream == stream)
        .map(|r| r.text.clone())
        .collect()
}
