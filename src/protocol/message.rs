//! RTSP request encoding and response parsing
//!
//! Requests are text messages terminated by an empty line:
//!
//! ```text
//! DESCRIBE rtsp://10.0.0.5/stream1 RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Responses share the same framing and may carry a body whose length is
//! given by `Content-Length`. On an interleaved connection responses can
//! arrive between binary `$` frames, so parsing works on a partially filled
//! buffer and reports when more data is needed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::constants::{MAX_BODY_SIZE, MAX_HEADER_SIZE, RTSP_VERSION};

/// RTSP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Teardown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Teardown => "TEARDOWN",
        }
    }
}

/// An outgoing RTSP request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Create a request without headers
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize with the given sequence number
    ///
    /// `CSeq` always comes first, followed by headers in insertion order.
    pub fn encode(&self, cseq: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);

        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.uri.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(RTSP_VERSION.as_bytes());
        buf.put_slice(b"\r\n");

        buf.put_slice(format!("CSeq: {}\r\n", cseq).as_bytes());
        for (name, value) in &self.headers {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");

        buf.freeze()
    }
}

/// A parsed RTSP response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    /// Try to parse one response from the front of `buf`
    ///
    /// Returns `Ok(None)` if the buffer doesn't hold a complete response yet.
    /// On success the response bytes are consumed from `buf`.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Response>, ProtocolError> {
        let Some((head_len, terminator)) = find_header_end(buf) else {
            if buf.len() > MAX_HEADER_SIZE {
                return Err(ProtocolError::MalformedResponse(
                    "header block too large".into(),
                ));
            }
            return Ok(None);
        };

        let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();
        let mut lines = head.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| ProtocolError::MalformedResponse("empty response".into()))?;
        let (status, reason) = parse_status_line(status_line)?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ProtocolError::MalformedResponse(format!("bad header line: {}", line))
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let content_length = match header_value(&headers, "Content-Length") {
            Some(value) => value.parse::<usize>().map_err(|_| {
                ProtocolError::MalformedResponse(format!("bad Content-Length: {}", value))
            })?,
            None => 0,
        };
        if content_length > MAX_BODY_SIZE {
            return Err(ProtocolError::MalformedResponse(format!(
                "body too large: {} bytes",
                content_length
            )));
        }

        let total = head_len + terminator + content_length;
        if buf.len() < total {
            return Ok(None);
        }

        let _ = buf.split_to(head_len + terminator);
        let body = buf.split_to(content_length).freeze();

        Ok(Some(Response {
            status,
            reason,
            headers,
            body,
        }))
    }

    /// First value of a header (case-insensitive name match)
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// All values of a header, in order
    pub fn headers_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sequence number echoed by the server
    pub fn cseq(&self) -> Option<u32> {
        self.header("CSeq").and_then(|v| v.parse().ok())
    }

    /// Session id without parameters (`;timeout=60` is dropped)
    pub fn session_id(&self) -> Option<&str> {
        self.header("Session")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
            .filter(|v| !v.is_empty())
    }

    /// Session timeout advertised in the `Session` header, in seconds
    pub fn session_timeout(&self) -> Option<u64> {
        self.header("Session")?
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().split_once('='))
            .find(|(name, _)| name.eq_ignore_ascii_case("timeout"))
            .and_then(|(_, value)| value.trim().parse().ok())
    }

    /// RTP channel from `interleaved=a-b` in the `Transport` header
    ///
    /// Cameras may assign channels other than the ones requested in SETUP.
    pub fn interleaved_channel(&self) -> Option<u8> {
        self.header("Transport")?
            .split(';')
            .filter_map(|param| param.trim().split_once('='))
            .find(|(name, _)| name.eq_ignore_ascii_case("interleaved"))
            .and_then(|(_, value)| value.split('-').next()?.trim().parse().ok())
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Locate the blank line ending the header block
///
/// Returns the header length and the terminator length. Some cameras end
/// lines with a bare `\n`, so both forms are accepted.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = buf.windows(2).position(|w| w == b"\n\n");

    match (crlf, lf) {
        (Some(a), Some(b)) if b < a => Some((b, 2)),
        (Some(a), _) => Some((a, 4)),
        (None, Some(b)) => Some((b, 2)),
        (None, None) => None,
    }
}

fn parse_status_line(line: &str) -> Result<(u16, String), ProtocolError> {
    let line = line.trim_end_matches('\r');
    let mut parts = line.splitn(3, ' ');

    let version = parts.next().unwrap_or_default();
    if !version.starts_with("RTSP/") {
        return Err(ProtocolError::MalformedResponse(format!(
            "bad status line: {}",
            line
        )));
    }

    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ProtocolError::MalformedResponse(format!("bad status code: {}", line)))?;
    let reason = parts.next().unwrap_or_default().to_string();

    Ok((status, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request() {
        let req = Request::new(Method::Describe, "rtsp://10.0.0.5/stream1")
            .header("Accept", "application/sdp")
            .header("User-Agent", "test");

        let encoded = req.encode(2);
        assert_eq!(
            &encoded[..],
            b"DESCRIBE rtsp://10.0.0.5/stream1 RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\nUser-Agent: test\r\n\r\n"
        );
    }

    #[test]
    fn test_parse_simple_response() {
        let mut buf = BytesMut::from(
            &b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE, SETUP, PLAY\r\n\r\n"[..],
        );

        let resp = Response::parse(&mut buf).unwrap().unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.cseq(), Some(1));
        assert_eq!(resp.header("public"), Some("OPTIONS, DESCRIBE, SETUP, PLAY"));
        assert!(resp.is_success());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_response_with_body() {
        let body = "v=0\r\nm=video 0 RTP/AVP 96\r\n";
        let raw = format!(
            "RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}$\x00",
            body.len(),
            body
        );
        let mut buf = BytesMut::from(raw.as_bytes());

        let resp = Response::parse(&mut buf).unwrap().unwrap();
        assert_eq!(&resp.body[..], body.as_bytes());
        // Trailing bytes stay in the buffer
        assert_eq!(&buf[..], b"$\x00");
    }

    #[test]
    fn test_parse_incomplete() {
        let mut buf = BytesMut::from(&b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n"[..]);
        assert!(Response::parse(&mut buf).unwrap().is_none());

        // Header complete but body missing
        let mut buf = BytesMut::from(&b"RTSP/1.0 200 OK\r\nContent-Length: 10\r\n\r\nabc"[..]);
        assert!(Response::parse(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 42);
    }

    #[test]
    fn test_parse_bare_lf() {
        let mut buf = BytesMut::from(&b"RTSP/1.0 404 Not Found\nCSeq: 3\n\n"[..]);
        let resp = Response::parse(&mut buf).unwrap().unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.reason, "Not Found");
        assert!(!resp.is_success());
    }

    #[test]
    fn test_parse_bad_status_line() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\n\r\n"[..]);
        assert!(matches!(
            Response::parse(&mut buf),
            Err(ProtocolError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_session_header() {
        let mut buf = BytesMut::from(
            &b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 12345678;timeout=60\r\n\r\n"[..],
        );
        let resp = Response::parse(&mut buf).unwrap().unwrap();
        assert_eq!(resp.session_id(), Some("12345678"));
        assert_eq!(resp.session_timeout(), Some(60));
    }

    #[test]
    fn test_transport_interleaved_channel() {
        let mut buf = BytesMut::from(
            &b"RTSP/1.0 200 OK\r\nCSeq: 4\r\nTransport: RTP/AVP/TCP;unicast;interleaved=6-7;ssrc=1A2B\r\n\r\n"[..],
        );
        let resp = Response::parse(&mut buf).unwrap().unwrap();
        assert_eq!(resp.interleaved_channel(), Some(6));

        let mut buf = BytesMut::from(&b"RTSP/1.0 200 OK\r\nCSeq: 5\r\n\r\n"[..]);
        let resp = Response::parse(&mut buf).unwrap().unwrap();
        assert_eq!(resp.interleaved_channel(), None);
    }

    #[test]
    fn test_multiple_headers() {
        let mut buf = BytesMut::from(
            &b"RTSP/1.0 401 Unauthorized\r\nCSeq: 2\r\nWWW-Authenticate: Digest realm=\"cam\", nonce=\"abc\"\r\nWWW-Authenticate: Basic realm=\"cam\"\r\n\r\n"[..],
        );
        let resp = Response::parse(&mut buf).unwrap().unwrap();
        let challenges: Vec<&str> = resp.headers_all("www-authenticate").collect();
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].starts_with("Digest"));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let mut buf = BytesMut::from(&vec![b'a'; MAX_HEADER_SIZE + 1][..]);
        assert!(Response::parse(&mut buf).is_err());
    }
}
