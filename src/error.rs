//! Error types
//!
//! All public operations return [`Result<T>`]. Wire-level failures are
//! described by [`ProtocolError`] and wrapped into [`Error::Protocol`].

use std::fmt;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum Error {
    /// Missing or invalid connection parameters (rejected before any I/O)
    Config(String),
    /// Initial dial or authentication failure
    Connect {
        /// Stream the dial was made for
        stream: String,
        /// Underlying failure
        source: Box<Error>,
    },
    /// No session registered for this stream id
    StreamNotFound(String),
    /// No client with this id attached to the stream
    ClientNotFound {
        /// Stream id
        stream: String,
        /// Client id
        client: String,
    },
    /// Mid-stream network fault; drives reconnect, never surfaced by the manager
    Receive(String),
    /// Session was torn down while the operation was in flight
    Teardown(String),
    /// RTSP / SDP / RTP wire error
    Protocol(ProtocolError),
    /// I/O error
    Io(String),
    /// Operation exceeded its deadline
    Timeout(&'static str),
}

impl Error {
    /// Whether callers should treat this as "stream not found"
    ///
    /// A session that was torn down while an operation raced against it
    /// looks exactly like an unknown stream to the caller.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::StreamNotFound(_) | Error::Teardown(_))
    }

    pub(crate) fn connect(stream: &str, source: Error) -> Self {
        Error::Connect {
            stream: stream.to_string(),
            source: Box::new(source),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Invalid stream configuration: {}", msg),
            Error::Connect { stream, source } => {
                write!(f, "Failed to connect stream {}: {}", stream, source)
            }
            Error::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
            Error::ClientNotFound { stream, client } => {
                write!(f, "Client {} not found on stream {}", client, stream)
            }
            Error::Receive(msg) => write!(f, "Receive error: {}", msg),
            Error::Teardown(id) => write!(f, "Stream torn down: {}", id),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
            Error::Timeout(what) => write!(f, "Timed out: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connect { source, .. } => Some(source.as_ref()),
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout("network operation")
    }
}

/// RTSP wire-level errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Response could not be parsed
    MalformedResponse(String),
    /// Server answered with a non-success status
    UnexpectedStatus {
        method: &'static str,
        status: u16,
        reason: String,
    },
    /// Credentials missing or rejected
    Unauthorized,
    /// Session description could not be parsed
    InvalidSdp(String),
    /// No media section we can set up
    NoPlayableMedia,
    /// Interleaved frame was malformed
    InvalidInterleaved(String),
    /// RTP packet was malformed
    InvalidRtp(String),
    /// Connection closed by the peer
    ConnectionClosed,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            ProtocolError::UnexpectedStatus {
                method,
                status,
                reason,
            } => write!(f, "{} failed: {} {}", method, status, reason),
            ProtocolError::Unauthorized => write!(f, "unauthorized"),
            ProtocolError::InvalidSdp(msg) => write!(f, "invalid SDP: {}", msg),
            ProtocolError::NoPlayableMedia => write!(f, "no playable media in session"),
            ProtocolError::InvalidInterleaved(msg) => {
                write!(f, "invalid interleaved frame: {}", msg)
            }
            ProtocolError::InvalidRtp(msg) => write!(f, "invalid RTP packet: {}", msg),
            ProtocolError::ConnectionClosed => write!(f, "connection closed by peer"),
        }
    }
}

impl std::error::Error for ProtocolError {}
