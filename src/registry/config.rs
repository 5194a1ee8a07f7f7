//! Stream manager configuration

use std::time::Duration;

use crate::client::ConnectorConfig;
use crate::media::DEFAULT_BUFFER_CAPACITY;
use crate::protocol::constants::DEFAULT_USER_AGENT;

/// Stream manager configuration options
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Packets kept per codec for each stream
    pub buffer_capacity: usize,

    /// How long a stream without clients is kept before it may be evicted
    pub eviction_grace: Duration,

    /// Delay before each reconnect attempt
    pub reconnect_backoff: Duration,

    /// Time allowed for TCP connect plus the RTSP handshake
    pub dial_timeout: Duration,

    /// Time allowed for each upstream read
    pub read_timeout: Duration,

    /// Interval between upstream keepalives
    pub keepalive_interval: Duration,

    /// Default User-Agent header (streams can override via options)
    pub user_agent: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            eviction_grace: Duration::from_secs(5 * 60),
            reconnect_backoff: Duration::from_secs(5),
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Set packets kept per codec (minimum 1)
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Set eviction grace period
    pub fn eviction_grace(mut self, grace: Duration) -> Self {
        self.eviction_grace = grace;
        self
    }

    /// Set reconnect backoff
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Set dial timeout
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set keepalive interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set User-Agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Connector settings derived from this config
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            dial_timeout: self.dial_timeout,
            read_timeout: self.read_timeout,
            keepalive_interval: self.keepalive_interval,
            disable_audio: false,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();

        assert_eq!(config.buffer_capacity, 100);
        assert_eq!(config.eviction_grace, Duration::from_secs(300));
        assert_eq!(config.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(config.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_buffer_capacity() {
        let config = ManagerConfig::default().buffer_capacity(250);

        assert_eq!(config.buffer_capacity, 250);
    }

    #[test]
    fn test_builder_buffer_capacity_minimum() {
        let config = ManagerConfig::default().buffer_capacity(0);

        assert_eq!(config.buffer_capacity, 1);
    }

    #[test]
    fn test_builder_eviction_grace() {
        let config = ManagerConfig::default().eviction_grace(Duration::from_secs(60));

        assert_eq!(config.eviction_grace, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_reconnect_backoff() {
        let config = ManagerConfig::default().reconnect_backoff(Duration::from_millis(500));

        assert_eq!(config.reconnect_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_connector_config() {
        let config = ManagerConfig::default()
            .dial_timeout(Duration::from_secs(2))
            .read_timeout(Duration::from_secs(8))
            .keepalive_interval(Duration::from_secs(15))
            .user_agent("nvr/2.0");

        let connector = config.connector_config();
        assert_eq!(connector.dial_timeout, Duration::from_secs(2));
        assert_eq!(connector.read_timeout, Duration::from_secs(8));
        assert_eq!(connector.keepalive_interval, Duration::from_secs(15));
        assert_eq!(connector.user_agent, "nvr/2.0");
        assert!(!connector.disable_audio);
    }
}
