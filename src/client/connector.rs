//! RTSP pull connection
//!
//! Drives one camera through the playback handshake and then reads media
//! from the same TCP connection:
//!
//! ```text
//! Client                                  Camera
//!   |---- OPTIONS ------------------------->|
//!   |---- DESCRIBE ------------------------>|
//!   |<--- 401 WWW-Authenticate -------------|  (if protected)
//!   |---- DESCRIBE + Authorization -------->|
//!   |<--- 200 SDP --------------------------|
//!   |---- SETUP track 1 (interleaved=0-1) ->|
//!   |---- SETUP track 2 (interleaved=2-3) ->|
//!   |---- PLAY ---------------------------->|
//!   |<=== $0 RTP / $1 RTCP / $2 ... ========|
//!   |---- OPTIONS (keepalive) ------------->|
//!   |---- TEARDOWN ------------------------>|
//! ```

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use url::Url;

use crate::error::{Error, ProtocolError, Result};
use crate::media::{CodecType, Packet};
use crate::protocol::constants::{DEFAULT_RTSP_PORT, INTERLEAVED_MAGIC, READ_BUFFER_SIZE};
use crate::protocol::sdp::resolve_control;
use crate::protocol::{
    Challenge, Credentials, InterleavedFrame, Method, Request, Response, RtpPacket,
    SessionDescription,
};

use super::config::{redacted, ConnectorConfig};

/// A media track set up for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Codec carried on this track
    pub codec: CodecType,
    /// Interleaved RTP channel (RTCP uses `channel + 1`)
    pub channel: u8,
    /// Control URL used for SETUP
    pub control: String,
    /// Clock rate from the SDP
    pub clock_rate: Option<u32>,
}

/// A playing RTSP session over one TCP connection
pub struct RtspConnector<S = TcpStream> {
    stream: S,
    read_buf: BytesMut,
    cseq: u32,
    config: ConnectorConfig,
    credentials: Option<Credentials>,
    challenge: Option<Challenge>,
    /// Requests signed with the current challenge's nonce
    nonce_count: u32,
    session: Option<String>,
    /// Aggregate control URL (used for PLAY, keepalive and TEARDOWN)
    control: String,
    tracks: Vec<Track>,
    keepalive_interval: Duration,
    last_keepalive: Instant,
}

impl<S> std::fmt::Debug for RtspConnector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtspConnector")
            .field("session", &self.session)
            .field("control", &self.control)
            .field("tracks", &self.tracks)
            .finish_non_exhaustive()
    }
}

impl RtspConnector<TcpStream> {
    /// Dial the camera and complete the handshake
    ///
    /// The TCP connect and every handshake exchange share one
    /// `dial_timeout` budget.
    pub async fn connect(url: &Url, config: ConnectorConfig) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config("stream URL has no host".into()))?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_RTSP_PORT);
        let dial_timeout = config.dial_timeout;

        tracing::debug!(url = %redacted(url), "Dialing camera");

        timeout(dial_timeout, Self::dial(&host, port, url, config))
            .await
            .map_err(|_| Error::Timeout("RTSP handshake"))?
    }

    async fn dial(host: &str, port: u16, url: &Url, config: ConnectorConfig) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, url, config).await
    }
}

impl<S> RtspConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run OPTIONS, DESCRIBE, SETUP and PLAY over an established transport
    pub async fn handshake(stream: S, url: &Url, config: ConnectorConfig) -> Result<Self> {
        let uri = wire_uri(url);
        let keepalive_interval = config.keepalive_interval;

        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            cseq: 0,
            config,
            credentials: Credentials::from_url(url),
            challenge: None,
            nonce_count: 0,
            session: None,
            control: uri.clone(),
            tracks: Vec::new(),
            keepalive_interval,
            last_keepalive: Instant::now(),
        };

        // Some cameras reject OPTIONS before authentication; only DESCRIBE matters
        if let Err(e) = conn.request(Method::Options, &uri, Vec::new()).await {
            tracing::debug!(error = %e, "OPTIONS failed, continuing with DESCRIBE");
        }

        let describe = conn
            .request(
                Method::Describe,
                &uri,
                vec![("Accept", "application/sdp".to_string())],
            )
            .await?;

        let base = describe
            .header("Content-Base")
            .or_else(|| describe.header("Content-Location"))
            .map(str::to_string)
            .unwrap_or_else(|| uri.clone());

        let body = String::from_utf8_lossy(&describe.body);
        let sdp = SessionDescription::parse(&body)?;

        let playable = sdp.playable(!conn.config.disable_audio);
        if playable.is_empty() {
            return Err(ProtocolError::NoPlayableMedia.into());
        }

        for (index, media) in playable.into_iter().enumerate() {
            let requested = (index * 2) as u8;
            let control = resolve_control(&base, media.control.as_deref());

            let transport = format!(
                "RTP/AVP/TCP;unicast;interleaved={}-{}",
                requested,
                requested + 1
            );
            let response = conn
                .request(Method::Setup, &control, vec![("Transport", transport)])
                .await?;

            // The camera has the final say on channel numbers
            let channel = response.interleaved_channel().unwrap_or(requested);

            if conn.session.is_none() {
                conn.session = response.session_id().map(str::to_string);
                if let Some(secs) = response.session_timeout().filter(|s| *s > 1) {
                    let server_interval = Duration::from_secs(secs / 2);
                    conn.keepalive_interval = conn.keepalive_interval.min(server_interval);
                }
            }

            tracing::debug!(
                codec = %media.codec,
                channel = channel,
                control = %control,
                "Track set up"
            );

            conn.tracks.push(Track {
                codec: media.codec.clone(),
                channel,
                control,
                clock_rate: media.clock_rate,
            });
        }

        conn.control = resolve_control(&base, sdp.control.as_deref());
        let control = conn.control.clone();
        conn.request(
            Method::Play,
            &control,
            vec![("Range", "npt=0.000-".to_string())],
        )
        .await?;
        conn.last_keepalive = Instant::now();

        tracing::info!(
            url = %redacted(url),
            tracks = conn.tracks.len(),
            session = conn.session.as_deref().unwrap_or("-"),
            "RTSP session playing"
        );

        Ok(conn)
    }

    /// Tracks negotiated during SETUP
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Session id assigned by the camera
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Read the next media packet
    ///
    /// RTCP frames and stray RTSP responses (keepalive replies) are
    /// consumed silently. Each socket read is bounded by `read_timeout`.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if self.last_keepalive.elapsed() >= self.keepalive_interval {
                self.send_keepalive().await?;
            }

            if let Some(packet) = self.take_packet()? {
                return Ok(packet);
            }

            let n = timeout(
                self.config.read_timeout,
                self.stream.read_buf(&mut self.read_buf),
            )
            .await
            .map_err(|_| Error::Timeout("media read"))??;

            if n == 0 {
                return Err(ProtocolError::ConnectionClosed.into());
            }
        }
    }

    /// Send TEARDOWN (best effort) and shut the transport down
    pub async fn close(mut self) {
        if self.session.is_some() {
            let control = self.control.clone();
            let request = self.build_request(Method::Teardown, &control, Vec::new());

            match timeout(self.config.read_timeout, self.send(&request)).await {
                Ok(Ok(_)) => tracing::debug!("TEARDOWN sent"),
                Ok(Err(e)) => tracing::debug!(error = %e, "TEARDOWN failed"),
                Err(_) => tracing::debug!("TEARDOWN timed out"),
            }
        }

        let _ = self.stream.shutdown().await;
    }

    /// Pull one packet out of the buffer, if a complete one is present
    fn take_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let Some(&first) = self.read_buf.first() else {
                return Ok(None);
            };

            if first == INTERLEAVED_MAGIC {
                let Some(frame) = InterleavedFrame::parse(&mut self.read_buf)? else {
                    return Ok(None);
                };
                if !frame.is_rtp() {
                    continue;
                }
                let Some(track) = self.tracks.iter().find(|t| t.channel == frame.channel) else {
                    tracing::trace!(channel = frame.channel, "Frame on unknown channel");
                    continue;
                };

                match RtpPacket::parse(frame.payload) {
                    Ok(rtp) => {
                        return Ok(Some(Packet::new(
                            track.codec.clone(),
                            rtp.payload,
                            rtp.timestamp,
                            rtp.sequence,
                            rtp.marker,
                        )));
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Dropping malformed RTP packet");
                        continue;
                    }
                }
            }

            if b"RTSP".starts_with(&self.read_buf[..self.read_buf.len().min(4)]) {
                if self.read_buf.len() < 4 {
                    return Ok(None);
                }
                match Response::parse(&mut self.read_buf)? {
                    Some(response) => {
                        tracing::trace!(status = response.status, "Keepalive response");
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            // Lost framing: skip to the next '$'
            let skip = self
                .read_buf
                .iter()
                .position(|b| *b == INTERLEAVED_MAGIC)
                .unwrap_or(self.read_buf.len());
            tracing::debug!(bytes = skip, "Skipping unframed data");
            self.read_buf.advance(skip);
        }
    }

    async fn send_keepalive(&mut self) -> Result<()> {
        let control = self.control.clone();
        let request = self.build_request(Method::Options, &control, Vec::new());
        self.send(&request).await?;
        self.last_keepalive = Instant::now();

        tracing::trace!("Keepalive sent");
        Ok(())
    }

    /// Send a request and wait for its response
    ///
    /// A `401` is answered once with credentials from the URL.
    async fn request(
        &mut self,
        method: Method,
        uri: &str,
        headers: Vec<(&'static str, String)>,
    ) -> Result<Response> {
        let mut retried = false;

        loop {
            let request = self.build_request(method, uri, headers.clone());
            let cseq = self.send(&request).await?;
            let response = self.read_response(cseq).await?;

            if response.status == 401 {
                if retried || self.credentials.is_none() {
                    return Err(ProtocolError::Unauthorized.into());
                }
                let challenge = Challenge::select(response.headers_all("WWW-Authenticate"))
                    .ok_or(ProtocolError::Unauthorized)?;
                self.challenge = Some(challenge);
                self.nonce_count = 0;
                retried = true;
                continue;
            }

            if !response.is_success() {
                return Err(ProtocolError::UnexpectedStatus {
                    method: method.as_str(),
                    status: response.status,
                    reason: response.reason,
                }
                .into());
            }

            return Ok(response);
        }
    }

    fn build_request(
        &mut self,
        method: Method,
        uri: &str,
        headers: Vec<(&'static str, String)>,
    ) -> Request {
        let mut request = Request::new(method, uri);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let (Some(credentials), Some(challenge)) = (&self.credentials, &self.challenge) {
            self.nonce_count += 1;
            request = request.header(
                "Authorization",
                credentials.authorization(challenge, method, uri, self.nonce_count),
            );
        }
        if let Some(session) = &self.session {
            request = request.header("Session", session.clone());
        }
        request.header("User-Agent", self.config.user_agent.clone())
    }

    /// Read until the response for `cseq` arrives
    async fn read_response(&mut self, cseq: u32) -> Result<Response> {
        loop {
            while self.read_buf.first() == Some(&INTERLEAVED_MAGIC) {
                if InterleavedFrame::parse(&mut self.read_buf)?.is_none() {
                    break;
                }
            }

            if self.read_buf.first() != Some(&INTERLEAVED_MAGIC) {
                if let Some(response) = Response::parse(&mut self.read_buf)? {
                    match response.cseq() {
                        Some(got) if got != cseq => {
                            tracing::trace!(expected = cseq, got = got, "Skipping stale response");
                        }
                        _ => return Ok(response),
                    }
                    continue;
                }
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed.into());
            }
        }
    }

    /// Write a request, returning the CSeq it was sent with
    async fn send(&mut self, request: &Request) -> Result<u32> {
        self.cseq += 1;
        self.stream.write_all(&request.encode(self.cseq)).await?;
        self.stream.flush().await?;
        Ok(self.cseq)
    }

    #[cfg(test)]
    fn playing(stream: S, tracks: Vec<Track>, config: ConnectorConfig) -> Self {
        let keepalive_interval = config.keepalive_interval;
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            cseq: 0,
            config,
            credentials: None,
            challenge: None,
            nonce_count: 0,
            session: Some("1234".into()),
            control: "rtsp://cam/stream".into(),
            tracks,
            keepalive_interval,
            last_keepalive: Instant::now(),
        }
    }
}

/// Request URI: the stream URL without user information
fn wire_uri(url: &Url) -> String {
    let mut url = url.clone();
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.to_string()
}
