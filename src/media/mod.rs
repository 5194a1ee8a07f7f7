//! Media handling
//!
//! This module provides:
//! - Packet and codec types for data received from cameras
//! - The bounded per-codec packet history kept for each stream

pub mod buffer;
pub mod packet;

pub use buffer::{PacketBuffer, DEFAULT_BUFFER_CAPACITY};
pub use packet::{CodecType, Packet};
