//! Media packet types
//!
//! A [`Packet`] is one RTP payload received from a camera, tagged with the
//! codec of the track it arrived on.

use std::fmt;

use bytes::Bytes;

/// Codec label for a media track
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodecType {
    H264,
    H265,
    Aac,
    Pcma,
    Pcmu,
    Opus,
    Mjpeg,
    /// Any other encoding, lowercased as it appeared in the SDP
    Other(String),
}

impl CodecType {
    /// Map an SDP `rtpmap` encoding name to a codec
    pub fn from_encoding(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "H264" => CodecType::H264,
            "H265" | "HEVC" => CodecType::H265,
            "MPEG4-GENERIC" | "MP4A-LATM" | "AAC" => CodecType::Aac,
            "PCMA" => CodecType::Pcma,
            "PCMU" => CodecType::Pcmu,
            "OPUS" => CodecType::Opus,
            "JPEG" | "MJPEG" => CodecType::Mjpeg,
            _ => CodecType::Other(name.to_ascii_lowercase()),
        }
    }

    /// Short lowercase label ("h264", "aac", ...)
    pub fn as_str(&self) -> &str {
        match self {
            CodecType::H264 => "h264",
            CodecType::H265 => "h265",
            CodecType::Aac => "aac",
            CodecType::Pcma => "pcma",
            CodecType::Pcmu => "pcmu",
            CodecType::Opus => "opus",
            CodecType::Mjpeg => "mjpeg",
            CodecType::Other(name) => name,
        }
    }

    /// Whether this is a video codec
    pub fn is_video(&self) -> bool {
        matches!(self, CodecType::H264 | CodecType::H265 | CodecType::Mjpeg)
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CodecType {
    fn from(label: &str) -> Self {
        Self::from_encoding(label)
    }
}

/// One unit of encoded media
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Codec of the track this packet arrived on
    pub codec: CodecType,
    /// RTP payload (zero-copy via reference counting)
    pub payload: Bytes,
    /// RTP timestamp in the track's clock rate
    pub timestamp: u32,
    /// RTP sequence number
    pub sequence: u16,
    /// RTP marker bit (end of access unit for video)
    pub marker: bool,
    /// Whether the payload starts or carries a keyframe
    pub is_keyframe: bool,
}

impl Packet {
    /// Create a packet, detecting keyframes from the payload
    pub fn new(
        codec: CodecType,
        payload: Bytes,
        timestamp: u32,
        sequence: u16,
        marker: bool,
    ) -> Self {
        let is_keyframe = is_keyframe(&codec, &payload);
        Self {
            codec,
            payload,
            timestamp,
            sequence,
            marker,
            is_keyframe,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// H.264 NAL unit types relevant to keyframe detection (RFC 6184)
const H264_NAL_IDR: u8 = 5;
const H264_NAL_SPS: u8 = 7;
const H264_NAL_STAP_A: u8 = 24;
const H264_NAL_FU_A: u8 = 28;

/// H.265 NAL unit types (RFC 7798)
const H265_NAL_IRAP_FIRST: u8 = 16;
const H265_NAL_IRAP_LAST: u8 = 21;
const H265_NAL_VPS: u8 = 32;
const H265_NAL_AP: u8 = 48;
const H265_NAL_FU: u8 = 49;

fn is_keyframe(codec: &CodecType, payload: &[u8]) -> bool {
    match codec {
        CodecType::H264 => h264_is_keyframe(payload),
        CodecType::H265 => h265_is_keyframe(payload),
        // Every JPEG frame is independently decodable
        CodecType::Mjpeg => true,
        _ => false,
    }
}

fn h264_is_keyframe(payload: &[u8]) -> bool {
    let Some(&header) = payload.first() else {
        return false;
    };

    match header & 0x1F {
        H264_NAL_IDR | H264_NAL_SPS => true,
        H264_NAL_STAP_A => {
            // 16-bit size followed by the first aggregated NAL header
            payload
                .get(3)
                .map(|nal| matches!(nal & 0x1F, H264_NAL_IDR | H264_NAL_SPS))
                .unwrap_or(false)
        }
        H264_NAL_FU_A => payload
            .get(1)
            .map(|fu| fu & 0x80 != 0 && fu & 0x1F == H264_NAL_IDR)
            .unwrap_or(false),
        _ => false,
    }
}

fn h265_is_keyframe(payload: &[u8]) -> bool {
    let Some(&header) = payload.first() else {
        return false;
    };

    let nal_type = (header >> 1) & 0x3F;
    match nal_type {
        H265_NAL_IRAP_FIRST..=H265_NAL_IRAP_LAST | H265_NAL_VPS => true,
        H265_NAL_AP => payload
            .get(4)
            .map(|nal| {
                let inner = (nal >> 1) & 0x3F;
                (H265_NAL_IRAP_FIRST..=H265_NAL_IRAP_LAST).contains(&inner) || inner == H265_NAL_VPS
            })
            .unwrap_or(false),
        H265_NAL_FU => payload
            .get(2)
            .map(|fu| {
                fu & 0x80 != 0 && (H265_NAL_IRAP_FIRST..=H265_NAL_IRAP_LAST).contains(&(fu & 0x3F))
            })
            .unwrap_or(false),
        _ => false,
    }
}
