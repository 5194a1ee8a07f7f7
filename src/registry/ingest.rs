//! Ingestion loop
//!
//! One task per session. It owns the upstream connection and is the only
//! code that reads from it:
//!
//! ```text
//!   Connecting ──first packet──► Streaming ◄──redial ok──┐
//!                                   │                    │
//!                              receive error             │
//!                                   ▼                    │
//!                              Reconnecting ─────────────┘
//!                                   │
//!                     redial failed, no clients
//!                                   ▼
//!                                Stopped ◄── stop_stream / idle eviction
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use url::Url;

use crate::client::{Dialer, Upstream};

use super::session::{SessionPhase, StreamSession};
use super::store::Shared;

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// `stop_stream` or shutdown
    Cancelled,
    /// Eviction deadline passed with no clients
    Idle,
    /// Redial failed and nobody was watching
    Unattended,
    /// The manager was dropped
    ManagerDropped,
}

pub(crate) async fn run<D: Dialer>(
    shared: Weak<Shared<D>>,
    session: Arc<StreamSession>,
    upstream: D::Connection,
    url: Url,
    backoff: Duration,
) {
    let mut upstream = upstream;

    tracing::info!(stream = %session.id(), "Ingestion started");

    let exit = loop {
        let received = tokio::select! {
            _ = session.cancelled() => None,
            result = upstream.receive() => Some(result),
        };

        match received {
            None => {
                upstream.close().await;
                break Exit::Cancelled;
            }
            Some(Ok(packet)) => {
                session.push_packet(packet).await;

                let Some(manager) = shared.upgrade() else {
                    upstream.close().await;
                    break Exit::ManagerDropped;
                };
                if manager.evict_if_idle(&session).await {
                    upstream.close().await;
                    break Exit::Idle;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(stream = %session.id(), error = %e, "Upstream receive failed");
                upstream.close().await;

                match reconnect(&shared, &session, &url, backoff).await {
                    Ok(next) => upstream = next,
                    Err(exit) => break exit,
                }
            }
        }
    };

    session.set_phase(SessionPhase::Stopped);
    let closed = session.close_clients().await;

    tracing::info!(
        stream = %session.id(),
        reason = ?exit,
        clients_closed = closed,
        "Ingestion stopped"
    );
}

/// Wait out the backoff and redial until it succeeds or the session retires
async fn reconnect<D: Dialer>(
    shared: &Weak<Shared<D>>,
    session: &Arc<StreamSession>,
    url: &Url,
    backoff: Duration,
) -> Result<D::Connection, Exit> {
    session.set_phase(SessionPhase::Reconnecting);

    loop {
        let waited = tokio::select! {
            _ = session.cancelled() => false,
            _ = tokio::time::sleep(backoff) => true,
        };
        if !waited {
            return Err(Exit::Cancelled);
        }

        let Some(manager) = shared.upgrade() else {
            return Err(Exit::ManagerDropped);
        };

        session.record_reconnect();
        let dialed = tokio::select! {
            _ = session.cancelled() => None,
            result = manager.dialer.dial(url, session.config()) => Some(result),
        };

        match dialed {
            None => return Err(Exit::Cancelled),
            Some(Ok(connection)) => {
                tracing::info!(stream = %session.id(), "Upstream reconnected");
                return Ok(connection);
            }
            Some(Err(e)) => {
                tracing::warn!(stream = %session.id(), error = %e, "Reconnect failed");
                if manager.retire_if_unattended(session).await {
                    return Err(Exit::Unattended);
                }
            }
        }
    }
}
