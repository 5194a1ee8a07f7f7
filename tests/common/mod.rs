//! Shared test helpers: tracing setup, an in-memory camera, and waiters

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

use rtsp_fanout::client::{Dialer, StreamConfig, Upstream};
use rtsp_fanout::error::{Error, ProtocolError, Result};
use rtsp_fanout::media::{CodecType, Packet};
use rtsp_fanout::registry::{SessionPhase, StreamManager};

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Upstream driven by a channel; dropping the sender is a receive error
pub struct SimulatedUpstream {
    feed: mpsc::UnboundedReceiver<Packet>,
}

impl Upstream for SimulatedUpstream {
    async fn receive(&mut self) -> Result<Packet> {
        self.feed
            .recv()
            .await
            .ok_or_else(|| Error::Receive("simulated connection reset".into()))
    }

    async fn close(self) {}
}

#[derive(Default)]
struct DialerState {
    dials: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Duration>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<Packet>>>,
    urls: Mutex<Vec<String>>,
}

/// Dialer producing simulated upstreams
///
/// Clones share state, so a test can keep one while the manager owns
/// another.
#[derive(Clone, Default)]
pub struct MockDialer {
    state: Arc<DialerState>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total dial attempts so far
    pub fn dial_count(&self) -> usize {
        self.state.dials.load(Ordering::SeqCst)
    }

    /// Make subsequent dials fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every dial by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Sender for the most recent connection
    pub fn latest_feed(&self) -> mpsc::UnboundedSender<Packet> {
        self.state
            .feeds
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection dialed yet")
    }

    /// Reset every open connection
    pub fn drop_connections(&self) {
        self.state.feeds.lock().unwrap().clear();
    }

    /// URLs passed to `dial`, credentials included
    pub fn dialed_urls(&self) -> Vec<String> {
        self.state.urls.lock().unwrap().clone()
    }
}

impl Dialer for MockDialer {
    type Connection = SimulatedUpstream;

    async fn dial(&self, url: &Url, _config: &StreamConfig) -> Result<SimulatedUpstream> {
        self.state.dials.fetch_add(1, Ordering::SeqCst);
        self.state.urls.lock().unwrap().push(url.to_string());

        let delay = *self.state.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.failing.load(Ordering::SeqCst) {
            return Err(ProtocolError::ConnectionClosed.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.feeds.lock().unwrap().push(tx);
        Ok(SimulatedUpstream { feed: rx })
    }
}

pub fn h264_packet(sequence: u16) -> Packet {
    Packet::new(
        CodecType::H264,
        Bytes::from(vec![0x41, (sequence & 0xFF) as u8]),
        sequence as u32 * 3000,
        sequence,
        true,
    )
}

pub fn camera(url: &str) -> StreamConfig {
    StreamConfig::new(url)
}

const SPINS: usize = 10_000;

/// Yield until the stream has received `count` packets in total
pub async fn wait_for_packets(manager: &StreamManager<MockDialer>, id: &str, count: u64) {
    for _ in 0..SPINS {
        if let Ok(stats) = manager.get_stream_stats(id).await {
            if stats.packets_received >= count {
                return;
            }
        }
        tokio::task::yield_now().await;
    }
    panic!("stream {} never received {} packets", id, count);
}

/// Yield until the stream reaches `phase`
pub async fn wait_for_phase(manager: &StreamManager<MockDialer>, id: &str, phase: SessionPhase) {
    for _ in 0..SPINS {
        if let Ok(stats) = manager.get_stream_stats(id).await {
            if stats.phase == phase {
                return;
            }
        }
        tokio::task::yield_now().await;
    }
    panic!("stream {} never reached {:?}", id, phase);
}

/// Yield until the stream is gone from the registry
pub async fn wait_for_removal(manager: &StreamManager<MockDialer>, id: &str) {
    for _ in 0..SPINS {
        if !manager.stream_exists(id).await {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("stream {} was never removed", id);
}

/// Yield until the dialer has been called `count` times
pub async fn wait_for_dials(dialer: &MockDialer, count: usize) {
    for _ in 0..SPINS {
        if dialer.dial_count() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("dialer reached {} dials, expected {}", dialer.dial_count(), count);
}
