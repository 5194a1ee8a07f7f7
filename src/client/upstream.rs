//! Upstream abstraction
//!
//! The manager never touches sockets directly. It asks a [`Dialer`] for a
//! connection and pulls packets through the [`Upstream`] trait, so the
//! transport can be swapped out (tests use an in-memory source).

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

use crate::error::{Error, Result};
use crate::media::Packet;

use super::config::{ConnectorConfig, StreamConfig};
use super::connector::RtspConnector;

/// A live media source
pub trait Upstream: Send + 'static {
    /// Wait for the next packet
    ///
    /// Any error means the connection is unusable and must be replaced.
    fn receive(&mut self) -> impl Future<Output = Result<Packet>> + Send;

    /// Release the connection
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens upstream connections
pub trait Dialer: Send + Sync + 'static {
    type Connection: Upstream;

    /// Connect and start playback
    ///
    /// `url` is the validated URL from [`StreamConfig::connect_url`],
    /// credentials included.
    fn dial(
        &self,
        url: &Url,
        config: &StreamConfig,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

impl<S> Upstream for RtspConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<Packet> {
        self.read_packet()
            .await
            .map_err(|e| Error::Receive(e.to_string()))
    }

    async fn close(self) {
        RtspConnector::close(self).await
    }
}

/// Dials cameras over RTSP/TCP
#[derive(Debug, Clone, Default)]
pub struct RtspDialer {
    config: ConnectorConfig,
}

impl RtspDialer {
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }
}

impl Dialer for RtspDialer {
    type Connection = RtspConnector;

    async fn dial(&self, url: &Url, config: &StreamConfig) -> Result<RtspConnector> {
        RtspConnector::connect(url, self.config.for_stream(config)).await
    }
}
