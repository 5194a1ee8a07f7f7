//! RTSP wire protocol
//!
//! The pieces a pulling client needs: request/response framing, SDP,
//! authentication challenges, and RTP-over-TCP interleaved frames.

pub mod auth;
pub mod constants;
pub mod message;
pub mod rtp;
pub mod sdp;

pub use auth::{Challenge, Credentials};
pub use message::{Method, Request, Response};
pub use rtp::{InterleavedFrame, RtpPacket};
pub use sdp::{MediaDescription, SessionDescription};
