//! RTSP protocol constants

/// Protocol version sent on every request line
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// Default RTSP port when the URL doesn't specify one
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Default User-Agent header
pub const DEFAULT_USER_AGENT: &str = concat!("rtsp-fanout/", env!("CARGO_PKG_VERSION"));

/// Marker byte that starts an interleaved binary frame (RFC 2326 §10.12)
pub const INTERLEAVED_MAGIC: u8 = b'$';

/// Interleaved frame header: magic + channel + 16-bit length
pub const INTERLEAVED_HEADER_SIZE: usize = 4;

/// Upper bound for a response header block
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

/// Upper bound for a response body (SDP)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Fixed RTP header size
pub const RTP_HEADER_SIZE: usize = 12;

/// RTP protocol version
pub const RTP_VERSION: u8 = 2;

/// Initial read buffer capacity
pub const READ_BUFFER_SIZE: usize = 64 * 1024;
