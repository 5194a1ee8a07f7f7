//! # rtsp-fanout
//!
//! Multi-camera RTSP ingestion with fan-out to many clients.
//!
//! Each camera is pulled over a single RTSP/TCP connection no matter how
//! many clients watch it. The manager keeps the most recent packets per
//! codec, reconnects on upstream failure, and evicts streams nobody has
//! watched for a grace period.
//!
//! ## Example
//!
//! ```no_run
//! use rtsp_fanout::{ManagerConfig, StreamConfig, StreamManager};
//!
//! #[tokio::main]
//! async fn main() -> rtsp_fanout::Result<()> {
//!     let manager = StreamManager::new(ManagerConfig::default());
//!
//!     let camera = StreamConfig::new("rtsp://192.168.1.64/Streaming/101")
//!         .credentials("admin", "secret")
//!         .option("disable_audio", "true");
//!     manager.start_stream("lobby", camera).await?;
//!
//!     let client = manager.add_client("lobby", "viewer-1").await?;
//!     for (codec, packets) in manager.get_latest_packets("lobby").await? {
//!         println!("{}: {} packets", codec, packets.len());
//!     }
//!
//!     manager.remove_client("lobby", client.id()).await?;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;

pub use client::{Dialer, RtspDialer, StreamConfig, Upstream};
pub use error::{Error, ProtocolError, Result};
pub use media::{CodecType, Packet, PacketBuffer};
pub use registry::{ClientHandle, ManagerConfig, SessionPhase, StreamManager, StreamStats};
