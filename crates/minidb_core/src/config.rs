//! Database configuration.

use crate::log::{MAX_KEY_LEN, MIN_RECORD_SIZE};

/// Upper bound for [`Config::max_value_size`].
///
/// Matches the longest string the record codec will decode, so anything
/// `set` accepts can be replayed.
pub const MAX_VALUE_SIZE: usize = minidb_codec::MAX_BYTES_LENGTH as usize;

/// Configuration for opening a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Fsync the log after every mutation.
    ///
    /// When false, mutations are synced in batches of `sync_batch_size` and
    /// on `flush`, `compact` and `close`.
    pub sync_on_write: bool,

    /// Largest accepted encoded value, in bytes. Capped at [`MAX_VALUE_SIZE`].
    pub max_value_size: usize,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Unsynced mutations allowed before an automatic sync (0 = never).
    pub sync_batch_size: usize,

    /// Compact automatically when the thresholds below are met.
    pub auto_compact: bool,

    /// Log size below which automatic compaction never runs.
    pub compaction_min_bytes: u64,

    /// Share of the log, in percent, that must be dead before compacting.
    pub compaction_garbage_ratio_percent: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_value_size: 16 * 1024 * 1024, // 16 MB
            create_if_missing: true,
            sync_batch_size: 64,
            auto_compact: true,
            compaction_min_bytes: 1024 * 1024, // 1 MB
            compaction_garbage_ratio_percent: 50,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the maximum encoded value size (capped at [`MAX_VALUE_SIZE`]).
    #[must_use]
    pub const fn max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = if size > MAX_VALUE_SIZE { MAX_VALUE_SIZE } else { size };
        self
    }

    /// Returns the value size limit actually enforced.
    ///
    /// The public field can be set past [`MAX_VALUE_SIZE`] directly; the cap
    /// still applies.
    #[must_use]
    pub const fn value_size_limit(&self) -> usize {
        if self.max_value_size > MAX_VALUE_SIZE {
            MAX_VALUE_SIZE
        } else {
            self.max_value_size
        }
    }

    /// Returns the longest record a database with this configuration writes.
    #[must_use]
    pub const fn max_record_len(&self) -> usize {
        MIN_RECORD_SIZE + MAX_KEY_LEN + self.value_size_limit()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets how many unsynced mutations trigger a sync.
    #[must_use]
    pub const fn sync_batch_size(mut self, count: usize) -> Self {
        self.sync_batch_size = count;
        self
    }

    /// Enables or disables automatic compaction.
    #[must_use]
    pub const fn auto_compact(mut self, value: bool) -> Self {
        self.auto_compact = value;
        self
    }

    /// Sets the minimum log size for automatic compaction.
    #[must_use]
    pub const fn compaction_min_bytes(mut self, bytes: u64) -> Self {
        self.compaction_min_bytes = bytes;
        self
    }

    /// Sets the dead-byte percentage that triggers compaction (capped at 100).
    #[must_use]
    pub const fn compaction_garbage_ratio_percent(mut self, percent: u8) -> Self {
        self.compaction_garbage_ratio_percent = if percent > 100 { 100 } else { percent };
        self
    }

    /// Returns whether a log of `total` bytes with `live` live bytes should be compacted.
    #[must_use]
    pub fn should_compact(&self, total: u64, live: u64) -> bool {
        if !self.auto_compact || total < self.compaction_min_bytes || total == 0 {
            return false;
        }
        let dead = total.saturating_sub(live);
        dead.saturating_mul(100) >= total.saturating_mul(u64::from(self.compaction_garbage_ratio_percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_size_is_capped_at_the_codec_limit() {
        let config = Config::new().max_value_size(usize::MAX);
        assert_eq!(config.max_value_size, MAX_VALUE_SIZE);

        let config = Config {
            max_value_size: usize::MAX,
            ..Config::default()
        };
        assert_eq!(config.value_size_limit(), MAX_VALUE_SIZE);
        assert_eq!(
            config.max_record_len(),
            MIN_RECORD_SIZE + MAX_KEY_LEN + MAX_VALUE_SIZE
        );
        assert_eq!(Config::new().max_value_size(10).value_size_limit(), 10);
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.sync_on_write);
        assert!(config.create_if_missing);
        assert_eq!(config.max_value_size, 16 * 1024 * 1024);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .sync_on_write(false)
            .max_value_size(1024)
            .sync_batch_size(8)
            .compaction_garbage_ratio_percent(250);

        assert!(!config.sync_on_write);
        assert_eq!(config.max_value_size, 1024);
        assert_eq!(config.sync_batch_size, 8);
        assert_eq!(config.compaction_garbage_ratio_percent, 100);
    }

    #[test]
    fn compaction_thresholds() {
        let config = Config::new()
            .compaction_min_bytes(1000)
            .compaction_garbage_ratio_percent(50);

        assert!(!config.should_compact(999, 0));
        assert!(!config.should_compact(1000, 501));
        assert!(config.should_compact(1000, 500));
        assert!(!config.auto_compact(false).should_compact(10_000, 0));
    }
}
