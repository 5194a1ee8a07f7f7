//! Stream manager implementation
//!
//! The central registry of camera sessions. All public operations go
//! through [`StreamManager`]; each session's ingestion task holds only a
//! weak reference back to it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use url::Url;

use crate::client::{Dialer, RtspDialer, StreamConfig};
use crate::error::{Error, Result};
use crate::media::{CodecType, Packet};

use super::client::ClientHandle;
use super::config::ManagerConfig;
use super::ingest;
use super::session::{StreamSession, StreamStats};

/// Outcome of an in-flight start, shared by every caller waiting on it
type StartOutcome = watch::Receiver<Option<Result<()>>>;

/// A registry entry
enum Slot {
    /// Dial in progress; waiters subscribe to the outcome
    Starting(StartOutcome),
    /// Session registered and ingesting
    Running(Arc<StreamSession>),
}

#[derive(Default)]
pub(crate) struct Registry {
    streams: HashMap<String, Slot>,
    /// Present only while a session has zero clients
    deadlines: HashMap<String, Instant>,
}

impl Registry {
    fn running(&self, id: &str) -> Result<&Arc<StreamSession>> {
        match self.streams.get(id) {
            Some(Slot::Running(session)) => Ok(session),
            _ => Err(Error::StreamNotFound(id.to_string())),
        }
    }

    /// Whether `id` still maps to this exact session
    fn is_current(&self, session: &Arc<StreamSession>) -> bool {
        matches!(
            self.streams.get(session.id()),
            Some(Slot::Running(current)) if Arc::ptr_eq(current, session)
        )
    }

    fn evict(&mut self, id: &str) {
        self.streams.remove(id);
        self.deadlines.remove(id);
    }
}

pub(crate) struct Shared<D> {
    registry: RwLock<Registry>,
    pub(crate) dialer: D,
    config: ManagerConfig,
}

impl<D: Dialer> Shared<D> {
    /// Remove the session if its eviction deadline has passed
    ///
    /// The deadline check, client count check and removal happen under one
    /// registry write lock.
    pub(crate) async fn evict_if_idle(&self, session: &Arc<StreamSession>) -> bool {
        let now = Instant::now();
        let id = session.id();

        {
            let registry = self.registry.read().await;
            match registry.deadlines.get(id) {
                Some(deadline) if now > *deadline => {}
                _ => return false,
            }
        }

        let mut registry = self.registry.write().await;
        let expired = registry
            .deadlines
            .get(id)
            .map_or(false, |deadline| now > *deadline);
        if !expired || !registry.is_current(session) || session.client_count().await > 0 {
            return false;
        }

        registry.evict(id);
        session.cancel();

        tracing::info!(stream = %id, "Stream evicted after idle grace period");
        true
    }

    /// Remove the session if nobody is attached
    ///
    /// Called after a failed redial. Returns `true` when the session should
    /// stop (removed here, or already gone from the registry).
    pub(crate) async fn retire_if_unattended(&self, session: &Arc<StreamSession>) -> bool {
        let mut registry = self.registry.write().await;
        if !registry.is_current(session) {
            return true;
        }
        if session.client_count().await > 0 {
            return false;
        }

        registry.evict(session.id());
        session.cancel();

        tracing::info!(stream = %session.id(), "Stream removed: upstream lost with no clients");
        true
    }

    /// Drop a `Starting` placeholder whose launch never finished
    async fn clear_starting(&self, id: &str) {
        let mut registry = self.registry.write().await;
        if matches!(registry.streams.get(id), Some(Slot::Starting(_))) {
            registry.streams.remove(id);
            tracing::warn!(stream = %id, "Stream start aborted");
        }
    }
}

/// Clears the `Starting` slot if `launch` unwinds before settling it
struct StartGuard<D: Dialer> {
    shared: Arc<Shared<D>>,
    id: String,
    armed: bool,
}

impl<D: Dialer> Drop for StartGuard<D> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        let id = std::mem::take(&mut self.id);
        runtime.spawn(async move { shared.clear_starting(&id).await });
    }
}

/// Manages camera sessions and their clients
///
/// Cheap to clone; clones share the same registry.
///
/// # Example
/// ```no_run
/// use rtsp_fanout::client::StreamConfig;
/// use rtsp_fanout::registry::{ManagerConfig, StreamManager};
///
/// # async fn example() -> rtsp_fanout::error::Result<()> {
/// let manager = StreamManager::new(ManagerConfig::default());
///
/// let config = StreamConfig::new("rtsp://192.168.1.64:554/Streaming/101")
///     .credentials("admin", "secret");
/// manager.start_stream("lobby", config).await?;
///
/// let client = manager.add_client("lobby", "viewer-1").await?;
/// let packets = manager.get_latest_packets("lobby").await?;
///
/// manager.remove_client("lobby", client.id()).await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamManager<D: Dialer = RtspDialer> {
    shared: Arc<Shared<D>>,
}

impl<D: Dialer> Clone for StreamManager<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl StreamManager<RtspDialer> {
    /// Create a manager that dials cameras over RTSP
    pub fn new(config: ManagerConfig) -> Self {
        let dialer = RtspDialer::new(config.connector_config());
        Self::with_dialer(config, dialer)
    }
}

impl Default for StreamManager<RtspDialer> {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl<D: Dialer> StreamManager<D> {
    /// Create a manager with a custom dialer
    pub fn with_dialer(config: ManagerConfig, dialer: D) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(Registry::default()),
                dialer,
                config,
            }),
        }
    }

    /// Get the manager configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Connect to a camera and start ingesting
    ///
    /// Returns once the upstream handshake has completed; packets arrive in
    /// the background. Starting an id that is already running is a no-op.
    /// Concurrent starts for the same id share one dial and its outcome.
    pub async fn start_stream(&self, id: &str, config: StreamConfig) -> Result<()> {
        let url = config.connect_url()?;

        let mut outcome = {
            let mut registry = self.shared.registry.write().await;
            match registry.streams.get(id) {
                Some(Slot::Running(_)) => {
                    tracing::debug!(stream = %id, "Stream already running");
                    return Ok(());
                }
                Some(Slot::Starting(outcome)) => outcome.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    registry
                        .streams
                        .insert(id.to_string(), Slot::Starting(rx.clone()));

                    // Runs to completion even if this caller goes away
                    tokio::spawn(launch(
                        Arc::clone(&self.shared),
                        id.to_string(),
                        config,
                        url,
                        tx,
                    ));
                    rx
                }
            }
        };

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(result) => result.clone(),
            Err(_) => None,
        };
        result.unwrap_or_else(|| Err(Error::Teardown(id.to_string())))
    }

    /// Stop a stream and close all of its clients
    ///
    /// Waits for the ingestion task to exit.
    pub async fn stop_stream(&self, id: &str) -> Result<()> {
        let session = {
            let mut registry = self.shared.registry.write().await;
            let session = match registry.streams.remove(id) {
                Some(Slot::Running(session)) => session,
                Some(starting) => {
                    registry.streams.insert(id.to_string(), starting);
                    return Err(Error::StreamNotFound(id.to_string()));
                }
                None => return Err(Error::StreamNotFound(id.to_string())),
            };
            registry.deadlines.remove(id);
            session
        };

        let closed = session.close_clients().await;
        session.cancel();
        session.join().await;

        tracing::info!(stream = %id, clients_closed = closed, "Stream stopped");
        Ok(())
    }

    /// Attach a client to a running stream
    ///
    /// Cancels any pending eviction deadline. An existing client with the
    /// same id is replaced and its signal closed.
    pub async fn add_client(&self, id: &str, client_id: &str) -> Result<ClientHandle> {
        let mut registry = self.shared.registry.write().await;
        let session = Arc::clone(registry.running(id)?);

        let handle = session.add_client(client_id).await?;
        if registry.deadlines.remove(id).is_some() {
            tracing::debug!(stream = %id, "Eviction deadline cleared");
        }

        tracing::info!(
            stream = %id,
            client = %client_id,
            clients = session.client_count().await,
            "Client added"
        );

        Ok(handle)
    }

    /// Detach a client and close its signal
    ///
    /// When the last client leaves, the stream becomes eligible for
    /// eviction after the grace period.
    pub async fn remove_client(&self, id: &str, client_id: &str) -> Result<()> {
        let mut registry = self.shared.registry.write().await;
        let session = Arc::clone(registry.running(id)?);

        let remaining = session.remove_client(client_id).await?;
        if remaining == 0 {
            let deadline = Instant::now() + self.shared.config.eviction_grace;
            registry.deadlines.insert(id.to_string(), deadline);

            tracing::info!(
                stream = %id,
                client = %client_id,
                grace_secs = self.shared.config.eviction_grace.as_secs(),
                "Last client removed, eviction deadline set"
            );
        } else {
            tracing::info!(
                stream = %id,
                client = %client_id,
                clients = remaining,
                "Client removed"
            );
        }

        Ok(())
    }

    /// Copy of the most recent packets per codec, oldest first
    pub async fn get_latest_packets(&self, id: &str) -> Result<HashMap<CodecType, Vec<Packet>>> {
        let session = self.session(id).await?;
        Ok(session.latest_packets().await)
    }

    /// Connection parameters the stream was started with
    pub async fn get_stream_config(&self, id: &str) -> Result<StreamConfig> {
        let session = self.session(id).await?;
        Ok(session.config().clone())
    }

    /// Clients attached to a stream, oldest first
    pub async fn get_clients(&self, id: &str) -> Result<Vec<ClientHandle>> {
        let session = self.session(id).await?;
        Ok(session.clients().await)
    }

    /// Get stream statistics
    pub async fn get_stream_stats(&self, id: &str) -> Result<StreamStats> {
        let session = self.session(id).await?;
        Ok(session.stats().await)
    }

    /// Pending eviction deadline, if the stream has no clients
    pub async fn eviction_deadline(&self, id: &str) -> Option<Instant> {
        self.shared.registry.read().await.deadlines.get(id).copied()
    }

    /// Check if a stream is running
    pub async fn stream_exists(&self, id: &str) -> bool {
        self.shared.registry.read().await.running(id).is_ok()
    }

    /// Ids of running streams, sorted
    pub async fn stream_ids(&self) -> Vec<String> {
        let registry = self.shared.registry.read().await;
        let mut ids: Vec<String> = registry
            .streams
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Running(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Get total number of running streams
    pub async fn stream_count(&self) -> usize {
        let registry = self.shared.registry.read().await;
        registry
            .streams
            .values()
            .filter(|slot| matches!(slot, Slot::Running(_)))
            .count()
    }

    /// Stop every running stream
    pub async fn shutdown(&self) {
        let ids = self.stream_ids().await;
        tracing::info!(streams = ids.len(), "Shutting down stream manager");

        for id in ids {
            // Streams can retire on their own while we iterate
            if let Err(e) = self.stop_stream(&id).await {
                tracing::debug!(stream = %id, error = %e, "Stream already gone");
            }
        }
    }

    async fn session(&self, id: &str) -> Result<Arc<StreamSession>> {
        let registry = self.shared.registry.read().await;
        registry.running(id).map(Arc::clone)
    }
}

/// Dial upstream and register the session, publishing the outcome
async fn launch<D: Dialer>(
    shared: Arc<Shared<D>>,
    id: String,
    config: StreamConfig,
    url: Url,
    outcome: watch::Sender<Option<Result<()>>>,
) {
    tracing::debug!(stream = %id, "Dialing upstream");

    let mut guard = StartGuard {
        shared: Arc::clone(&shared),
        id: id.clone(),
        armed: true,
    };

    let result = match shared.dialer.dial(&url, &config).await {
        Ok(upstream) => {
            let session = Arc::new(StreamSession::new(
                id.as_str(),
                config,
                shared.config.buffer_capacity,
            ));

            let mut registry = shared.registry.write().await;
            let task = tokio::spawn(ingest::run(
                Arc::downgrade(&shared),
                Arc::clone(&session),
                upstream,
                url,
                shared.config.reconnect_backoff,
            ));
            session.set_task(task).await;
            registry
                .streams
                .insert(id.clone(), Slot::Running(session));

            tracing::info!(stream = %id, "Stream started");
            Ok(())
        }
        Err(e) => {
            shared.registry.write().await.streams.remove(&id);

            tracing::warn!(stream = %id, error = %e, "Failed to start stream");
            Err(Error::connect(&id, e))
        }
    };

    guard.armed = false;
    outcome.send_replace(Some(result));
}
