//! Client handles
//!
//! A client is a subscriber attached to one stream. The manager only keeps
//! its registration and a cancellation signal; delivery of media to the
//! client is up to the caller.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A subscriber's registration on a stream
///
/// Clones share the same signal. The signal is closed exactly once: when
/// the client is removed, replaced, or the stream is torn down.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: String,
    signal: CancellationToken,
    created_at: Instant,
}

impl ClientHandle {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            signal: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    /// Client identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the client was added
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether the signal has been closed
    pub fn is_closed(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Wait until the signal is closed
    pub async fn closed(&self) {
        self.signal.cancelled().await
    }

    /// A token that is cancelled together with this handle
    ///
    /// Cancelling the returned token does not close the handle.
    pub fn signal(&self) -> CancellationToken {
        self.signal.child_token()
    }

    pub(crate) fn close(&self) {
        self.signal.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_is_shared_by_clones() {
        let handle = ClientHandle::new("u1");
        let clone = handle.clone();
        assert!(!clone.is_closed());

        handle.close();
        assert!(clone.is_closed());
        clone.closed().await;

        // Closing twice is harmless
        handle.close();
        assert!(handle.is_closed());
    }

    #[test]
    fn test_child_signal_does_not_close_handle() {
        let handle = ClientHandle::new("u1");
        let signal = handle.signal();

        signal.cancel();
        assert!(!handle.is_closed());

        let signal = handle.signal();
        handle.close();
        assert!(signal.is_cancelled());
    }
}
