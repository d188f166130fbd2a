/// Kafka internal topic that keeps track of Consumer's committed Offsets.
/// Topic patterns never match it.
pub(crate) const CONSUMER_OFFSETS_TOPIC: &str = "__consumer_offsets";

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: &str = "6564";

/// Seconds between two refreshes of a binder, when not running `--once`.
pub const DEFAULT_REFRESH_INTERVAL_SECS: &str = "60";

/// Matches every relation (SQL `LIKE` syntax).
pub const DEFAULT_RELNAME_PATTERN: &str = "%";

/// Indexes smaller than this (in bytes) are ignored.
pub const DEFAULT_INDEX_MIN_SIZE: &str = "100000";

pub const DEFAULT_SLOW_QUERY_THRESHOLD_SECS: &str = "60";
