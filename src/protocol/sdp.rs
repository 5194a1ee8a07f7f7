//! Session description parsing
//!
//! Only the parts needed to set up playback are read: media sections
//! (`m=`), their payload mapping (`a=rtpmap`) and control URLs
//! (`a=control`). Everything else is ignored.

use crate::error::ProtocolError;
use crate::media::CodecType;

/// Parsed session description
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    /// Session-level control URL
    pub control: Option<String>,
    /// Media sections in declaration order
    pub media: Vec<MediaDescription>,
}

/// One `m=` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    /// Media kind ("video", "audio", "application")
    pub kind: String,
    /// First payload type listed in the `m=` line
    pub payload_type: u8,
    /// Codec resolved from `rtpmap` or the static payload table
    pub codec: CodecType,
    /// Clock rate in Hz, if known
    pub clock_rate: Option<u32>,
    /// Media-level control URL
    pub control: Option<String>,
}

impl MediaDescription {
    fn new(kind: String, payload_type: u8) -> Self {
        let (codec, clock_rate) = static_payload(payload_type);
        Self {
            kind,
            payload_type,
            codec,
            clock_rate,
            control: None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == "video"
    }

    pub fn is_audio(&self) -> bool {
        self.kind == "audio"
    }
}

impl SessionDescription {
    /// Parse SDP text
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut sdp = SessionDescription::default();
        let mut saw_version = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((kind, value)) = line.split_once('=') else {
                return Err(ProtocolError::InvalidSdp(format!("bad line: {}", line)));
            };

            match kind {
                "v" => saw_version = true,
                "m" => sdp.media.push(parse_media_line(value)?),
                "a" => sdp.apply_attribute(value),
                _ => {}
            }
        }

        if !saw_version {
            return Err(ProtocolError::InvalidSdp("missing v= line".into()));
        }

        Ok(sdp)
    }

    fn apply_attribute(&mut self, attr: &str) {
        let (name, value) = attr.split_once(':').unwrap_or((attr, ""));

        match (name, self.media.last_mut()) {
            ("control", Some(media)) => media.control = Some(value.trim().to_string()),
            ("control", None) => self.control = Some(value.trim().to_string()),
            ("rtpmap", Some(media)) => {
                // rtpmap:<pt> <encoding>/<clock>[/<channels>]
                let Some((pt, mapping)) = value.trim().split_once(' ') else {
                    return;
                };
                if pt.parse::<u8>().ok() != Some(media.payload_type) {
                    return;
                }
                let mut parts = mapping.trim().split('/');
                if let Some(encoding) = parts.next() {
                    media.codec = CodecType::from_encoding(encoding);
                }
                if let Some(clock) = parts.next().and_then(|c| c.parse().ok()) {
                    media.clock_rate = Some(clock);
                }
            }
            _ => {}
        }
    }

    /// Media sections that can be played
    ///
    /// Video is always selected; audio unless `include_audio` is false.
    pub fn playable(&self, include_audio: bool) -> Vec<&MediaDescription> {
        self.media
            .iter()
            .filter(|m| m.is_video() || (include_audio && m.is_audio()))
            .collect()
    }
}

fn parse_media_line(value: &str) -> Result<MediaDescription, ProtocolError> {
    // m=<media> <port> <proto> <fmt> ...
    let mut parts = value.split_whitespace();
    let kind = parts
        .next()
        .ok_or_else(|| ProtocolError::InvalidSdp(format!("bad media line: {}", value)))?;
    let _port = parts.next();
    let _proto = parts.next();
    let payload_type = parts
        .next()
        .and_then(|pt| pt.parse::<u8>().ok())
        .ok_or_else(|| ProtocolError::InvalidSdp(format!("bad media format: {}", value)))?;

    Ok(MediaDescription::new(kind.to_string(), payload_type))
}

/// Static payload types from RFC 3551 that cameras use without `rtpmap`
fn static_payload(payload_type: u8) -> (CodecType, Option<u32>) {
    match payload_type {
        0 => (CodecType::Pcmu, Some(8000)),
        8 => (CodecType::Pcma, Some(8000)),
        26 => (CodecType::Mjpeg, Some(90000)),
        other => (CodecType::Other(format!("pt{}", other)), None),
    }
}

/// Resolve a control attribute against the base URL
///
/// `*` or a missing control means the base itself; absolute URLs are used
/// as given; anything else is appended to the base.
pub fn resolve_control(base: &str, control: Option<&str>) -> String {
    match control {
        None | Some("") | Some("*") => base.to_string(),
        Some(c) if c.starts_with("rtsp://") || c.starts_with("rtsps://") => c.to_string(),
        Some(c) => {
            if base.ends_with('/') {
                format!("{}{}", base, c.trim_start_matches('/'))
            } else {
                format!("{}/{}", base, c.trim_start_matches('/'))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERA_SDP: &str = "v=0\r\n\
o=- 1 1 IN IP4 192.168.1.64\r\n\
s=Media Presentation\r\n\
c=IN IP4 0.0.0.0\r\n\
t=0 0\r\n\
a=control:*\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=fmtp:96 profile-level-id=420029; packetization-mode=1\r\n\
a=control:trackID=1\r\n\
m=audio 0 RTP/AVP 8\r\n\
a=rtpmap:8 PCMA/8000\r\n\
a=control:trackID=2\r\n\
m=application 0 RTP/AVP 107\r\n\
a=rtpmap:107 vnd.onvif.metadata/90000\r\n\
a=control:trackID=3\r\n";

    #[test]
    fn test_parse_camera_sdp() {
        let sdp = SessionDescription::parse(CAMERA_SDP).unwrap();

        assert_eq!(sdp.control.as_deref(), Some("*"));
        assert_eq!(sdp.media.len(), 3);

        let video = &sdp.media[0];
        assert!(video.is_video());
        assert_eq!(video.payload_type, 96);
        assert_eq!(video.codec, CodecType::H264);
        assert_eq!(video.clock_rate, Some(90000));
        assert_eq!(video.control.as_deref(), Some("trackID=1"));

        let audio = &sdp.media[1];
        assert!(audio.is_audio());
        assert_eq!(audio.codec, CodecType::Pcma);
        assert_eq!(audio.clock_rate, Some(8000));
    }

    #[test]
    fn test_playable_filters_media() {
        let sdp = SessionDescription::parse(CAMERA_SDP).unwrap();

        let all = sdp.playable(true);
        assert_eq!(all.len(), 2);

        let video_only = sdp.playable(false);
        assert_eq!(video_only.len(), 1);
        assert_eq!(video_only[0].codec, CodecType::H264);
    }

    #[test]
    fn test_static_payload_without_rtpmap() {
        let sdp =
            SessionDescription::parse("v=0\nm=audio 0 RTP/AVP 0\nm=video 0 RTP/AVP 26\n")
                .unwrap();
        assert_eq!(sdp.media[0].codec, CodecType::Pcmu);
        assert_eq!(sdp.media[1].codec, CodecType::Mjpeg);
    }

    #[test]
    fn test_rtpmap_for_other_payload_ignored() {
        let sdp = SessionDescription::parse("v=0\nm=video 0 RTP/AVP 96\na=rtpmap:97 H265/90000\n")
            .unwrap();
        assert_eq!(sdp.media[0].codec, CodecType::Other("pt96".into()));
    }

    #[test]
    fn test_missing_version() {
        assert!(matches!(
            SessionDescription::parse("m=video 0 RTP/AVP 96\n"),
            Err(ProtocolError::InvalidSdp(_))
        ));
    }

    #[test]
    fn test_bad_media_line() {
        assert!(SessionDescription::parse("v=0\nm=video\n").is_err());
    }

    #[test]
    fn test_resolve_control() {
        let base = "rtsp://10.0.0.5/Streaming/101";
        assert_eq!(resolve_control(base, None), base);
        assert_eq!(resolve_control(base, Some("*")), base);
        assert_eq!(
            resolve_control(base, Some("trackID=1")),
            "rtsp://10.0.0.5/Streaming/101/trackID=1"
        );
        assert_eq!(
            resolve_control("rtsp://10.0.0.5/live/", Some("track1")),
            "rtsp://10.0.0.5/live/track1"
        );
        assert_eq!(
            resolve_control(base, Some("rtsp://10.0.0.5/other/track")),
            "rtsp://10.0.0.5/other/track"
        );
    }
}
