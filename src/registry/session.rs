//! Per-stream session state
//!
//! A session is shared between the manager (client bookkeeping, reads) and
//! its ingestion task (packet writes, phase changes). Client records and the
//! packet buffer sit behind one `Mutex`; counters are atomics so stats can be
//! read without contending with ingestion.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::StreamConfig;
use crate::error::{Error, Result};
use crate::media::{CodecType, Packet, PacketBuffer};

use super::client::ClientHandle;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Dialed, waiting for the first packet
    Connecting,
    /// Receiving packets
    Streaming,
    /// Upstream failed, redialing
    Reconnecting,
    /// Ingestion has ended
    Stopped,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Connecting => "connecting",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Reconnecting => "reconnecting",
            SessionPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time statistics for one stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub phase: SessionPhase,
    pub client_count: usize,
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Redial attempts since the session started
    pub reconnects: u64,
    /// Buffered packets per codec
    pub buffered: HashMap<CodecType, usize>,
    /// Payload bytes currently buffered across all codecs
    pub buffered_bytes: usize,
    /// Time since the session was created
    pub uptime: Duration,
}

struct SessionInner {
    clients: HashMap<String, ClientHandle>,
    buffer: PacketBuffer,
    /// Set once teardown has closed the clients; no new clients after that
    closed: bool,
}

/// One camera's live session
pub struct StreamSession {
    id: String,
    config: StreamConfig,
    inner: Mutex<SessionInner>,
    phase: watch::Sender<SessionPhase>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    reconnects: AtomicU64,
    started_at: Instant,
}

impl StreamSession {
    pub(crate) fn new(
        id: impl Into<String>,
        config: StreamConfig,
        buffer_capacity: usize,
    ) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Connecting);
        Self {
            id: id.into(),
            config,
            inner: Mutex::new(SessionInner {
                clients: HashMap::new(),
                buffer: PacketBuffer::with_capacity(buffer_capacity),
                closed: false,
            }),
            phase,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Register a client, replacing (and closing) any handle with the same id
    pub(crate) async fn add_client(&self, client_id: &str) -> Result<ClientHandle> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(Error::Teardown(self.id.clone()));
        }

        let handle = ClientHandle::new(client_id);
        if let Some(previous) = inner.clients.insert(client_id.to_string(), handle.clone()) {
            previous.close();
            tracing::debug!(stream = %self.id, client = %client_id, "Client handle replaced");
        }

        Ok(handle)
    }

    /// Close and remove a client, returning how many remain
    pub(crate) async fn remove_client(&self, client_id: &str) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let handle = inner
            .clients
            .remove(client_id)
            .ok_or_else(|| Error::ClientNotFound {
                stream: self.id.clone(),
                client: client_id.to_string(),
            })?;
        handle.close();

        Ok(inner.clients.len())
    }

    /// Close every client signal and refuse new clients
    pub(crate) async fn close_clients(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.closed = true;

        let count = inner.clients.len();
        for (_, handle) in inner.clients.drain() {
            handle.close();
        }
        count
    }

    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.clients.len()
    }

    /// Attached clients, oldest first
    pub async fn clients(&self) -> Vec<ClientHandle> {
        let inner = self.inner.lock().await;
        let mut clients: Vec<ClientHandle> = inner.clients.values().cloned().collect();
        clients.sort_by_key(|c| c.created_at());
        clients
    }

    /// Copy of the buffered packets per codec
    pub async fn latest_packets(&self) -> HashMap<CodecType, Vec<Packet>> {
        self.inner.lock().await.buffer.snapshot()
    }

    pub async fn stats(&self) -> StreamStats {
        let (client_count, buffered, buffered_bytes) = {
            let inner = self.inner.lock().await;
            (inner.clients.len(), inner.buffer.counts(), inner.buffer.size())
        };

        StreamStats {
            phase: self.phase(),
            client_count,
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            buffered,
            buffered_bytes,
            uptime: self.started_at.elapsed(),
        }
    }

    /// Append a received packet to the buffer
    pub(crate) async fn push_packet(&self, packet: Packet) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(packet.size() as u64, Ordering::Relaxed);

        self.inner.lock().await.buffer.push(packet);

        self.set_phase(SessionPhase::Streaming);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        let changed = self.phase.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
        if changed {
            tracing::debug!(stream = %self.id, phase = %phase, "Session phase changed");
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub(crate) async fn set_task(&self, handle: JoinHandle<()>) {
        *self.task.lock().await = Some(handle);
    }

    /// Wait for the ingestion task to exit
    pub(crate) async fn join(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(stream = %self.id, error = %e, "Ingestion task failed");
            }
        }
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
