//! Runtime configuration for the poller and the default dispatcher

use std::time::Duration;
use tracing::warn;

/// Disposal configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalConfig {
    /// Delay between the end of one poll cycle and the start of the next
    pub poll_interval: Duration,
    /// Upper bound for stopping the poller and the default dispatcher, each
    pub shutdown_timeout: Duration,
    /// Idle time after which a default dispatcher worker exits
    pub keep_alive: Duration,
    /// Upper bound on default dispatcher workers; further callbacks queue
    pub max_threads: usize,
    /// Name of the poller thread, also the prefix of worker thread names
    pub thread_name: String,
}

impl Default for DisposalConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(60),
            max_threads: 512,
            thread_name: "garbage-disposal".to_string(),
        }
    }
}

impl DisposalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // GARBAGE_DISPOSAL_POLL_INTERVAL_MS: fixed delay between poll cycles
        if let Some(interval) = duration_from_env("GARBAGE_DISPOSAL_POLL_INTERVAL_MS") {
            config.poll_interval = interval;
        }

        // GARBAGE_DISPOSAL_SHUTDOWN_TIMEOUT_MS: bound for each graceful stop
        if let Some(timeout) = duration_from_env("GARBAGE_DISPOSAL_SHUTDOWN_TIMEOUT_MS") {
            config.shutdown_timeout = timeout;
        }

        // GARBAGE_DISPOSAL_KEEP_ALIVE_MS: idle worker lifetime
        if let Some(keep_alive) = duration_from_env("GARBAGE_DISPOSAL_KEEP_ALIVE_MS") {
            config.keep_alive = keep_alive;
        }

        // GARBAGE_DISPOSAL_MAX_THREADS: default dispatcher worker limit
        if let Some(max_threads) = count_from_env("GARBAGE_DISPOSAL_MAX_THREADS") {
            config.max_threads = max_threads;
        }

        config
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

fn duration_from_env(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    parse_millis(&raw).or_else(|| {
        warn!(variable = key, value = %raw, "Ignoring invalid duration, using default");
        None
    })
}

fn count_from_env(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    parse_count(&raw).or_else(|| {
        warn!(variable = key, value = %raw, "Ignoring invalid count, using default");
        None
    })
}

fn parse_millis(raw: &str) -> Option<Duration> {
    parse_count(raw).map(|ms| Duration::from_millis(ms as u64))
}

fn parse_count(raw: &str) -> Option<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}
