//! Engine configuration.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum size of the active segment before rotation. The active file
    /// may exceed this by at most one record.
    pub max_segment_size: u64,

    /// How often the merger wakes up on its own, in addition to rotation
    /// events.
    pub merge_interval: Duration,

    /// Minimum number of sealed segments before a merge is worthwhile.
    pub merge_min_segments: usize,

    /// Capacity of the writer's request queue.
    pub write_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_segment_size: 10 * 1024 * 1024, // 10 MiB
            merge_interval: Duration::from_secs(30),
            merge_min_segments: 3,
            write_queue_capacity: 100,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum active-segment size before rotation.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the merger's wake-up interval.
    #[must_use]
    pub const fn merge_interval(mut self, interval: Duration) -> Self {
        self.merge_interval = interval;
        self
    }

    /// Sets the sealed-segment count below which merge cycles are skipped.
    #[must_use]
    pub const fn merge_min_segments(mut self, count: usize) -> Self {
        self.merge_min_segments = count;
        self
    }

    /// Sets the writer request queue capacity.
    #[must_use]
    pub const fn write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_segment_size, 10 * 1024 * 1024);
        assert_eq!(config.merge_interval, Duration::from_secs(30));
        assert_eq!(config.merge_min_segments, 3);
        assert_eq!(config.write_queue_capacity, 100);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .max_segment_size(4096)
            .merge_interval(Duration::from_millis(50))
            .merge_min_segments(2);

        assert_eq!(config.max_segment_size, 4096);
        assert_eq!(config.merge_interval, Duration::from_millis(50));
        assert_eq!(config.merge_min_segments, 2);
        assert_eq!(config.write_queue_capacity, 100);
    }
}
