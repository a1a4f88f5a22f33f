// src/fabric/observer.rs

//! TCP observer endpoint.
//!
//! Protocol: the client sends its slug as the first line, then receives one
//! line of text per log record until either side closes the connection.
//! Anything else the client sends is ignored.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::fabric::registry::{ObserverConnection, SubscriptionRegistry};
use crate::types::{LogRecord, Slug};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest handshake line read; a valid slug is far shorter.
const HANDSHAKE_LIMIT: u64 = 256;

const INBOUND_SCRATCH: usize = 512;

type Connections = Arc<Mutex<JoinSet<()>>>;

/// Accept loop for observer connections.
///
/// Connection tasks are tracked so that [`ObserverServer::drain`] can wait
/// for them to write out what their queues still hold.
pub struct ObserverServer {
    local_addr: SocketAddr,
    accept: JoinHandle<()>,
    connections: Connections,
}

impl ObserverServer {
    /// Bind `addr` and start accepting observers in the background.
    pub async fn bind(
        addr: &str,
        registry: Arc<SubscriptionRegistry>,
        buffer: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding observer listener on {addr}"))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "observer listener started");

        let connections = Connections::default();
        let accept = tokio::spawn(accept_loop(
            listener,
            registry,
            buffer,
            Arc::clone(&connections),
        ));
        Ok(Self {
            local_addr,
            accept,
            connections,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new observers. Established connections keep running.
    pub fn stop_accepting(&self) {
        self.accept.abort();
        debug!(local_addr = %self.local_addr, "observer listener stopped");
    }

    /// Wait up to `grace` for every connection task to finish, then abort the
    /// rest.
    ///
    /// Connections only finish once the registry has dropped them, so call
    /// this after [`SubscriptionRegistry::close_all`].
    pub async fn drain(self, grace: Duration) {
        self.stop_accepting();
        let mut connections = std::mem::take(&mut *lock(&self.connections));
        let open = connections.len();

        let finished = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        match finished {
            Ok(()) => debug!(connections = open, "observer connections drained"),
            Err(_) => {
                warn!(
                    ?grace,
                    remaining = connections.len(),
                    "observer connections still writing after grace period; aborting"
                );
                connections.shutdown().await;
            }
        }
    }
}

fn lock(connections: &Connections) -> MutexGuard<'_, JoinSet<()>> {
    match connections.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<SubscriptionRegistry>,
    buffer: usize,
    connections: Connections,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let registry = Arc::clone(&registry);
                let mut tasks = lock(&connections);
                // Reap finished connections so the set stays small.
                while tasks.try_join_next().is_some() {}
                tasks.spawn(async move {
                    if let Err(e) = serve_observer(stream, registry, buffer).await {
                        debug!(%peer, error = %e, "observer connection ended with error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept observer connection");
            }
        }
    }
}

/// Read the slug line. Bytes that are not UTF-8 are replaced, which makes the
/// slug invalid rather than failing the read.
async fn read_handshake<R>(reader: &mut R) -> std::io::Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    reader
        .take(HANDSHAKE_LIMIT)
        .read_until(b'\n', &mut raw)
        .await?;
    Ok(String::from_utf8_lossy(&raw).trim().to_string())
}

async fn serve_observer(
    stream: TcpStream,
    registry: Arc<SubscriptionRegistry>,
    buffer: usize,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake(&mut reader))
        .await
        .context("observer handshake timed out")??;
    let slug = match Slug::parse(&first) {
        Ok(slug) => slug,
        Err(_) => {
            debug!(raw = %first, "observer sent no valid slug; disconnecting");
            write_half.write_all(b"error: invalid slug\n").await?;
            return Ok(());
        }
    };

    let (conn, mut rx) = ObserverConnection::channel(slug.clone(), buffer);
    let id = registry.join(conn);

    // Anything the client sends after the handshake is discarded.
    let mut scratch = [0u8; INBOUND_SCRATCH];
    let result = loop {
        tokio::select! {
            record = rx.recv() => match record {
                Some(record) => {
                    if let Err(e) = write_record(&mut write_half, &record).await {
                        break Err(e.into());
                    }
                }
                None => break Ok(()),
            },
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => break Ok(()),
                Ok(_) => {}
            },
        }
    };

    registry.leave(&slug, id);
    let _ = write_half.shutdown().await;
    result
}

/// Render one record as a single line.
pub fn render_line(record: &LogRecord) -> String {
    let mut line = record.text.replace('\n', " ");
    line.push('\n');
    line
}

async fn write_record<W: AsyncWrite + Unpin>(writer: &mut W, record: &LogRecord) -> std::io::Result<()> {
    writer.write_all(render_line(record).as_bytes()).await
}

/// Client side of the protocol, used by `buildcast watch`.
///
/// Every received line is passed to `on_line`; returns when the server closes
/// the connection.
pub async fn watch<F>(addr: &str, slug: &Slug, mut on_line: F) -> Result<()>
where
    F: FnMut(&str),
{
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to observer listener at {addr}"))?;
    stream.write_all(format!("{slug}\n").as_bytes()).await?;

    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        on_line(&line);
    }
    Ok(())
}
