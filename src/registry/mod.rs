//! Stream registry and fan-out management
//!
//! The manager keeps one session per camera and lets any number of clients
//! attach to it. Each session runs a single ingestion task that owns the
//! upstream connection, fills a bounded per-codec packet buffer and handles
//! reconnects and idle eviction.
//!
//! # Architecture
//!
//! ```text
//!                         StreamManager (Clone)
//!                     ┌──────────────────────────┐
//!                     │ RwLock<Registry {        │
//!                     │   streams: id -> Slot,   │
//!                     │   deadlines: id -> when, │
//!                     │ }>                       │
//!                     └────────────┬─────────────┘
//!                                  │ Arc<StreamSession>
//!           ┌──────────────────────┼──────────────────────┐
//!           ▼                      ▼                      ▼
//!     [Session cam1]         [Session cam2]         [Session cam3]
//!     Mutex<clients,         Mutex<clients,               ...
//!           buffer>                buffer>
//!           ▲                      ▲
//!     ingest task ◄── Upstream (RTSP/TCP) ◄── camera
//! ```
//!
//! # Locking
//!
//! The registry lock guards membership and eviction deadlines and is never
//! held across a network call. Session locks are only taken while holding
//! the registry lock, never the other way round.

pub mod client;
pub mod config;
mod ingest;
pub mod session;
pub mod store;

pub use client::ClientHandle;
pub use config::ManagerConfig;
pub use session::{SessionPhase, StreamSession, StreamStats};
pub use store::StreamManager;
