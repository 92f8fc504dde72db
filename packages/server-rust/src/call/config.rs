//! Tunables for the call engine: relay timing, history and retention caps.

use std::time::Duration;

/// Configuration for call execution, streaming, and retention.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// How long a relay waits on the queue before counting idle time.
    pub stream_poll_interval: Duration,
    /// Total idle time after which a relay synthesizes a timeout error.
    pub stream_timeout: Duration,
    /// Maximum milestone events retained per session (oldest evicted first).
    pub session_buffer_max: usize,
    /// Maximum terminal calls retained before FIFO eviction.
    /// Pending and running calls are never evicted.
    pub retained_terminal_max: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            stream_poll_interval: Duration::from_millis(200),
            stream_timeout: Duration::from_secs(300),
            session_buffer_max: 50,
            retained_terminal_max: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_config_defaults() {
        let config = CallConfig::default();
        assert_eq!(config.stream_poll_interval, Duration::from_millis(200));
        assert_eq!(config.stream_timeout, Duration::from_secs(300));
        assert_eq!(config.session_buffer_max, 50);
        assert_eq!(config.retained_terminal_max, 1024);
    }
}
