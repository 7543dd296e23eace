use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub max_reconnect_attempts: u32,
    /// Base delay; attempt `n` waits `n * reconnect_delay`.
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        self.reconnect_delay * attempt
    }
}
