//! Interleaved framing and RTP header parsing
//!
//! With RTP-over-TCP (RFC 2326 §10.12) media shares the RTSP connection.
//! Each binary frame is prefixed with a 4-byte header:
//!
//! ```text
//! +------+---------+----------------+
//! | '$'  | channel | length (u16 BE)| payload...
//! +------+---------+----------------+
//! ```
//!
//! Even channels carry RTP, odd channels carry RTCP for the same track.
//!
//! RTP fixed header (RFC 3550 §5.1):
//! ```text
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! |                           timestamp                           |
//! |                             SSRC                              |
//! |                     CSRC list (CC * 4 bytes)                  |
//! ```

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::constants::{
    INTERLEAVED_HEADER_SIZE, INTERLEAVED_MAGIC, RTP_HEADER_SIZE, RTP_VERSION,
};

/// One `$`-framed binary chunk from the RTSP connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedFrame {
    pub channel: u8,
    pub payload: Bytes,
}

impl InterleavedFrame {
    /// Try to take one frame from the front of `buf`
    ///
    /// Returns `Ok(None)` if more data is needed. The buffer must start
    /// with the `$` marker.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < INTERLEAVED_HEADER_SIZE {
            return Ok(None);
        }
        if buf[0] != INTERLEAVED_MAGIC {
            return Err(ProtocolError::InvalidInterleaved(format!(
                "expected '$', found 0x{:02x}",
                buf[0]
            )));
        }

        let channel = buf[1];
        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if buf.len() < INTERLEAVED_HEADER_SIZE + length {
            return Ok(None);
        }

        buf.advance(INTERLEAVED_HEADER_SIZE);
        let payload = buf.split_to(length).freeze();

        Ok(Some(Self { channel, payload }))
    }

    /// Whether this frame is on an RTP (even) channel
    pub fn is_rtp(&self) -> bool {
        self.channel % 2 == 0
    }
}

/// A parsed RTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Bytes,
}

impl RtpPacket {
    /// Parse an RTP packet, stripping CSRCs, extension and padding
    pub fn parse(mut data: Bytes) -> Result<Self, ProtocolError> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(ProtocolError::InvalidRtp(format!(
                "packet too short: {} bytes",
                data.len()
            )));
        }

        let first = data.get_u8();
        let version = first >> 6;
        if version != RTP_VERSION {
            return Err(ProtocolError::InvalidRtp(format!("version {}", version)));
        }
        let has_padding = first & 0x20 != 0;
        let has_extension = first & 0x10 != 0;
        let csrc_count = (first & 0x0F) as usize;

        let second = data.get_u8();
        let marker = second & 0x80 != 0;
        let payload_type = second & 0x7F;
        let sequence = data.get_u16();
        let timestamp = data.get_u32();
        let ssrc = data.get_u32();

        let csrc_len = csrc_count * 4;
        if data.len() < csrc_len {
            return Err(ProtocolError::InvalidRtp("truncated CSRC list".into()));
        }
        data.advance(csrc_len);

        if has_extension {
            if data.len() < 4 {
                return Err(ProtocolError::InvalidRtp("truncated extension header".into()));
            }
            let _profile = data.get_u16();
            let ext_len = data.get_u16() as usize * 4;
            if data.len() < ext_len {
                return Err(ProtocolError::InvalidRtp("truncated extension".into()));
            }
            data.advance(ext_len);
        }

        if has_padding {
            let padding = data.last().copied().unwrap_or(0) as usize;
            if padding == 0 || padding > data.len() {
                return Err(ProtocolError::InvalidRtp(format!("bad padding {}", padding)));
            }
            data.truncate(data.len() - padding);
        }

        Ok(Self {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            payload: data,
        })
    }
}
