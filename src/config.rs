use std::num::NonZeroUsize;
use std::time::Duration;

// Defaults for the demo run.
pub const DEFAULT_CAPACITY: usize = 10;
pub const PRODUCE_INTERVAL_MS: u64 = 500;
pub const CONSUME_INTERVAL_MS: u64 = 1000;

/// Produced values fall in `0..VALUE_BOUND`.
pub const VALUE_BOUND: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub capacity: NonZeroUsize,
    /// Pause after each produced value.
    pub produce_interval: Duration,
    /// Pause after each consumed value.
    pub consume_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            produce_interval: Duration::from_millis(PRODUCE_INTERVAL_MS),
            consume_interval: Duration::from_millis(CONSUME_INTERVAL_MS),
        }
    }
}

#[test]
fn default_matches_constants() {
    let config = Config::default();
    assert_eq!(config.capacity.get(), 10);
    assert_eq!(config.produce_interval, Duration::from_millis(500));
    assert_eq!(config.consume_interval, Duration::from_secs(1));
}
