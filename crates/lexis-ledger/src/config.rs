//! Session configuration

use std::time::Duration;

/// Default time without activity before pending work is flushed
pub const DEFAULT_IDLE_FLUSH_AFTER: Duration = Duration::from_secs(120);

/// Default bound on any single store call made during a flush
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of drafts kept live per participant
pub const DEFAULT_DRAFT_RETENTION: usize = 5;

/// Default license rate a rater assigns to the story they rate
pub const DEFAULT_RATER_LICENSE_RATE: f64 = 2.0;

/// Configuration for a participant session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which the background task flushes pending work
    pub idle_flush_after: Duration,
    /// How often the background task checks for idleness
    pub idle_check_interval: Duration,
    /// Timeout for each store call
    pub store_timeout: Duration,
    /// Drafts beyond the newest N become inactive
    pub draft_retention: usize,
    /// License rate recorded on ratings made through this session
    pub rater_license_rate: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_flush_after: DEFAULT_IDLE_FLUSH_AFTER,
            idle_check_interval: Duration::from_secs(10),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            draft_retention: DEFAULT_DRAFT_RETENTION,
            rater_license_rate: DEFAULT_RATER_LICENSE_RATE,
        }
    }
}

impl SessionConfig {
    /// Create a config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timeouts for tests
    pub fn testing() -> Self {
        Self {
            idle_flush_after: Duration::from_secs(2),
            idle_check_interval: Duration::from_millis(100),
            store_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    pub fn with_idle_flush_after(mut self, after: Duration) -> Self {
        self.idle_flush_after = after;
        self
    }

    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Keep at least one draft live
    pub fn with_draft_retention(mut self, retention: usize) -> Self {
        self.draft_retention = retention.max(1);
        self
    }

    pub fn with_rater_license_rate(mut self, rate: f64) -> Self {
        self.rater_license_rate = rate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new();
        assert_eq!(config.idle_flush_after, Duration::from_secs(120));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.draft_retention, 5);
        assert_eq!(config.rater_license_rate, 2.0);
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new()
            .with_draft_retention(0)
            .with_store_timeout(Duration::from_millis(50));
        assert_eq!(config.draft_retention, 1);
        assert_eq!(config.store_timeout, Duration::from_millis(50));
    }
}
