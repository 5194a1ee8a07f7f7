//! RTSP client
//!
//! Pulls media from IP cameras:
//! - [`StreamConfig`] describes one camera (URL, credentials, options)
//! - [`RtspConnector`] performs the handshake and reads RTP-over-TCP
//! - [`Dialer`] / [`Upstream`] are the seams the stream manager drives

pub mod config;
pub mod connector;
pub mod upstream;

pub use config::{ConnectorConfig, StreamConfig};
pub use connector::{RtspConnector, Track};
pub use upstream::{Dialer, RtspDialer, Upstream};
