//! Database configuration.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the folder under the provider root that holds every collection.
    pub root_name: String,

    /// Stale documents are all written at least this often.
    pub flush_interval: Duration,

    /// How many partial writes may run per second.
    pub partial_writes_per_second: u32,

    /// Pre-constructed instances kept per document type.
    pub pool_size: usize,

    /// Merge new documents field-by-field into the stored version.
    ///
    /// Disabling this drops stored fields the current type no longer declares.
    pub merge_on_write: bool,

    /// Pretty-print stored JSON.
    pub indent_json: bool,

    /// How often the ticker wakes up.
    pub tick_interval: Duration,

    /// Attempts at writing a collection definition before giving up.
    pub definition_write_attempts: u32,

    /// Attempts at writing one document during a flush.
    pub document_write_attempts: u32,

    /// How long `force_full_write` waits for a flush already in progress.
    pub lock_timeout: Duration,

    /// Whether to run the background ticker.
    pub ticker_enabled: bool,

    /// Log banners when the database starts and shuts down.
    pub startup_messages: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_name: "docstash".to_string(),
            flush_interval: Duration::from_secs(10),
            partial_writes_per_second: 1,
            pool_size: 2000,
            merge_on_write: true,
            indent_json: true,
            tick_interval: Duration::from_millis(100),
            definition_write_attempts: 3,
            document_write_attempts: 3,
            lock_timeout: Duration::from_secs(30),
            ticker_enabled: true,
            startup_messages: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root folder name.
    #[must_use]
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Sets the full flush interval.
    #[must_use]
    pub const fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets how many partial writes may run per second.
    #[must_use]
    pub const fn partial_writes_per_second(mut self, rate: u32) -> Self {
        self.partial_writes_per_second = rate;
        self
    }

    /// Sets the per-type pool size.
    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets whether writes merge with the stored document.
    #[must_use]
    pub const fn merge_on_write(mut self, value: bool) -> Self {
        self.merge_on_write = value;
        self
    }

    /// Sets whether stored JSON is indented.
    #[must_use]
    pub const fn indent_json(mut self, value: bool) -> Self {
        self.indent_json = value;
        self
    }

    /// Sets the ticker cadence.
    #[must_use]
    pub const fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets how many times a collection definition write is attempted.
    #[must_use]
    pub const fn definition_write_attempts(mut self, attempts: u32) -> Self {
        self.definition_write_attempts = attempts;
        self
    }

    /// Sets how many times a document write is attempted per flush.
    #[must_use]
    pub const fn document_write_attempts(mut self, attempts: u32) -> Self {
        self.document_write_attempts = attempts;
        self
    }

    /// Sets the write lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether the background ticker runs.
    #[must_use]
    pub const fn ticker_enabled(mut self, value: bool) -> Self {
        self.ticker_enabled = value;
        self
    }

    /// Sets whether startup and shutdown banners are logged.
    #[must_use]
    pub const fn startup_messages(mut self, value: bool) -> Self {
        self.startup_messages = value;
        self
    }

    /// Minimum time between two partial writes.
    #[must_use]
    pub fn partial_write_interval(&self) -> Duration {
        Duration::from_secs(1) / self.partial_writes_per_second.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.root_name, "docstash");
        assert_eq!(config.flush_interval, Duration::from_secs(10));
        assert_eq!(config.pool_size, 2000);
        assert!(config.merge_on_write);
        assert!(config.indent_json);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .root_name("saves")
            .merge_on_write(false)
            .pool_size(16)
            .ticker_enabled(false);

        assert_eq!(config.root_name, "saves");
        assert!(!config.merge_on_write);
        assert_eq!(config.pool_size, 16);
        assert!(!config.ticker_enabled);
    }

    #[test]
    fn partial_write_interval() {
        assert_eq!(
            Config::new().partial_write_interval(),
            Duration::from_secs(1)
        );
        assert_eq!(
            Config::new()
                .partial_writes_per_second(4)
                .partial_write_interval(),
            Duration::from_millis(250)
        );
        assert_eq!(
            Config::new()
                .partial_writes_per_second(0)
                .partial_write_interval(),
            Duration::from_secs(1)
        );
    }
}
