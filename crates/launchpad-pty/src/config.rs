//! Tuning knobs for PTY sessions.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for PTY sessions.
///
/// The idle flush latency is `poll_interval * idle_flush_ticks`. The two are
/// deliberately separate: the interval bounds how long the reader sleeps when
/// nothing happens, the tick count decides how much silence makes a partial
/// line (an interactive prompt) worth showing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    /// Upper bound on a single wait for PTY data, in milliseconds.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Number of consecutive empty polls before a partial line is flushed.
    pub idle_flush_ticks: u32,
    /// Size of a single read from the PTY master.
    pub read_buffer_size: usize,
    /// A partial line longer than this is emitted even without a newline.
    pub max_line_bytes: usize,
    /// Capacity of the event channel to the consumer.
    pub channel_capacity: usize,
    /// How long to keep draining output once the child has exited, in
    /// milliseconds.
    #[serde(rename = "drain_timeout_ms", with = "millis")]
    pub drain_timeout: Duration,
    /// Terminal width reported to the child.
    pub cols: u16,
    /// Terminal height reported to the child.
    pub rows: u16,
    /// Value of `TERM` in the child environment.
    pub term: String,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            idle_flush_ticks: 2,
            read_buffer_size: 4096,
            max_line_bytes: 64 * 1024,
            channel_capacity: 256,
            drain_timeout: Duration::from_millis(200),
            cols: 80,
            rows: 24,
            term: "xterm-256color".to_string(),
        }
    }
}

impl PtyConfig {
    /// Defaults sized to the caller's terminal when `COLUMNS`/`LINES` hold
    /// usable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let dimension = |name: &str| std::env::var(name).ok().as_deref().and_then(parse_dimension);
        Self {
            cols: dimension("COLUMNS").unwrap_or(defaults.cols),
            rows: dimension("LINES").unwrap_or(defaults.rows),
            ..defaults
        }
    }

    /// Idle time after which a partial line is flushed.
    pub fn idle_flush_latency(&self) -> Duration {
        self.poll_interval * self.idle_flush_ticks
    }

    /// Checks the values a session cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }
        if self.idle_flush_ticks == 0 {
            return Err("idle_flush_ticks must be at least 1".to_string());
        }
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be greater than zero".to_string());
        }
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be greater than zero".to_string());
        }
        if self.cols == 0 || self.rows == 0 {
            return Err("cols and rows must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A terminal dimension; zero or garbage is ignored.
fn parse_dimension(value: &str) -> Option<u16> {
    value.trim().parse().ok().filter(|&n| n > 0)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
