//! Per-codec packet history
//!
//! Each stream keeps the most recent packets for every codec it carries so
//! a transport layer can hand a late joiner something to start from. The
//! history is a bounded FIFO: once a codec holds `capacity` packets, every
//! new packet pushes out the oldest one.

use std::collections::{HashMap, VecDeque};

use super::packet::{CodecType, Packet};

/// Default number of packets kept per codec
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Bounded per-codec FIFO of recent packets
#[derive(Debug)]
pub struct PacketBuffer {
    /// Maximum packets kept per codec
    capacity: usize,
    /// Packets by codec, oldest first
    tracks: HashMap<CodecType, VecDeque<Packet>>,
    /// Sum of payload sizes across all codecs
    size_bytes: usize,
}

impl PacketBuffer {
    /// Create a buffer with the default capacity (100 per codec)
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a buffer keeping at most `capacity` packets per codec
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tracks: HashMap::new(),
            size_bytes: 0,
        }
    }

    /// Append a packet to its codec's history
    ///
    /// Returns the packet that was dropped to make room, if any.
    pub fn push(&mut self, packet: Packet) -> Option<Packet> {
        let capacity = self.capacity;
        let track = self
            .tracks
            .entry(packet.codec.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        self.size_bytes += packet.size();
        track.push_back(packet);

        if track.len() > capacity {
            let dropped = track.pop_front();
            if let Some(ref old) = dropped {
                self.size_bytes -= old.size();
            }
            dropped
        } else {
            None
        }
    }

    /// Copy of the current history
    ///
    /// Payloads are reference counted, so this does not copy media data.
    pub fn snapshot(&self) -> HashMap<CodecType, Vec<Packet>> {
        self.tracks
            .iter()
            .map(|(codec, packets)| (codec.clone(), packets.iter().cloned().collect()))
            .collect()
    }

    /// Number of packets held for each codec
    pub fn counts(&self) -> HashMap<CodecType, usize> {
        self.tracks
            .iter()
            .map(|(codec, packets)| (codec.clone(), packets.len()))
            .collect()
    }

    /// Total payload bytes buffered
    pub fn size(&self) -> usize {
        self.size_bytes
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}
