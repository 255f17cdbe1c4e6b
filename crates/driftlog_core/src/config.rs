//! Log configuration.

/// Store limit used when a configuration leaves it at zero.
pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024;

/// Index limit used when a configuration leaves it at zero.
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;

/// Per-segment limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentConfig {
    /// Store size at which a segment counts as maxed.
    pub max_store_bytes: u64,

    /// Index capacity reserved for each segment, in bytes.
    pub max_index_bytes: u64,

    /// Base offset of the first segment of a fresh log.
    pub initial_offset: u64,
}

/// Configuration for opening a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Segment limits.
    pub segment: SegmentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment: SegmentConfig {
                max_store_bytes: DEFAULT_MAX_STORE_BYTES,
                max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
                initial_offset: 0,
            },
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store size limit.
    #[must_use]
    pub const fn max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    /// Sets the index capacity.
    #[must_use]
    pub const fn max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Sets the base offset of a fresh log.
    #[must_use]
    pub const fn initial_offset(mut self, offset: u64) -> Self {
        self.segment.initial_offset = offset;
        self
    }

    /// Replaces zero limits with the defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.segment.max_store_bytes == 0 {
            self.segment.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if self.segment.max_index_bytes == 0 {
            self.segment.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.segment.max_store_bytes, DEFAULT_MAX_STORE_BYTES);
        assert_eq!(config.segment.max_index_bytes, DEFAULT_MAX_INDEX_BYTES);
        assert_eq!(config.segment.initial_offset, 0);
    }

    #[test]
    fn zero_limits_are_normalized() {
        let config = Config::new()
            .max_store_bytes(0)
            .max_index_bytes(0)
            .initial_offset(5)
            .normalized();

        assert_eq!(config.segment.max_store_bytes, DEFAULT_MAX_STORE_BYTES);
        assert_eq!(config.segment.max_index_bytes, DEFAULT_MAX_INDEX_BYTES);
        assert_eq!(config.segment.initial_offset, 5);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new().max_store_bytes(32).max_index_bytes(36);
        assert_eq!(config.segment.max_store_bytes, 32);
        assert_eq!(config.segment.max_index_bytes, 36);
    }
}
