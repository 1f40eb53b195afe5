use std::time::Duration;

use medialoom_core::pool::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_THREADS, DEFAULT_MIN_THREADS};

/// Engine configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-node deployment; override
/// via environment variables in production.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Intake queue depth for stream-transcode jobs.
    pub stream_queue_depth: usize,
    /// Simultaneous external processes.
    pub stream_concurrency: usize,
    /// Intake queue depth for thumbnail jobs.
    pub thumbnail_queue_depth: usize,
    /// Simultaneous thumbnail jobs (each runs its own bounded thread pool).
    pub thumbnail_concurrency: usize,
    /// Lower clamp on per-job thread count.
    pub thumbnail_min_threads: usize,
    /// Upper clamp on per-job thread count.
    pub thumbnail_max_threads: usize,
    /// Intake queue depth for metadata-enrich jobs.
    pub batch_queue_depth: usize,
    /// Simultaneous batch loops (each with internal item-level concurrency).
    pub batch_concurrency: usize,
    /// Default failed-item fraction above which a job fails as a whole.
    pub failure_threshold: f64,
    /// Grace period between terminate and kill when cancelling a process.
    pub grace_period: Duration,
    /// Minimum interval between published progress events per job.
    pub publish_interval: Duration,
    /// Heartbeat interval for stream jobs producing no parseable output.
    pub heartbeat_interval: Duration,
    /// Per-item operation timeout for batch jobs.
    pub item_timeout: Duration,
    /// Base delay for per-item retry backoff (doubles per attempt).
    pub retry_base_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_queue_depth: 8,
            stream_concurrency: 2,
            thumbnail_queue_depth: 16,
            thumbnail_concurrency: 2,
            thumbnail_min_threads: DEFAULT_MIN_THREADS,
            thumbnail_max_threads: DEFAULT_MAX_THREADS,
            batch_queue_depth: 4,
            batch_concurrency: 1,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            grace_period: Duration::from_secs(5),
            publish_interval: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(10),
            item_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `STREAM_QUEUE_DEPTH`        | `8`     |
    /// | `STREAM_CONCURRENCY`        | `2`     |
    /// | `THUMBNAIL_QUEUE_DEPTH`     | `16`    |
    /// | `THUMBNAIL_CONCURRENCY`     | `2`     |
    /// | `THUMBNAIL_MIN_THREADS`     | `2`     |
    /// | `THUMBNAIL_MAX_THREADS`     | `32`    |
    /// | `BATCH_QUEUE_DEPTH`         | `4`     |
    /// | `BATCH_CONCURRENCY`         | `1`     |
    /// | `FAILURE_THRESHOLD`         | `0.5`   |
    /// | `GRACE_PERIOD_SECS`         | `5`     |
    /// | `PUBLISH_INTERVAL_MS`       | `50`    |
    /// | `HEARTBEAT_INTERVAL_SECS`   | `10`    |
    /// | `ITEM_TIMEOUT_SECS`         | `30`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stream_queue_depth: env_parse("STREAM_QUEUE_DEPTH", defaults.stream_queue_depth),
            stream_concurrency: env_parse("STREAM_CONCURRENCY", defaults.stream_concurrency),
            thumbnail_queue_depth: env_parse(
                "THUMBNAIL_QUEUE_DEPTH",
                defaults.thumbnail_queue_depth,
            ),
            thumbnail_concurrency: env_parse(
                "THUMBNAIL_CONCURRENCY",
                defaults.thumbnail_concurrency,
            ),
            thumbnail_min_threads: env_parse(
                "THUMBNAIL_MIN_THREADS",
                defaults.thumbnail_min_threads,
            ),
            thumbnail_max_threads: env_parse(
                "THUMBNAIL_MAX_THREADS",
                defaults.thumbnail_max_threads,
            ),
            batch_queue_depth: env_parse("BATCH_QUEUE_DEPTH", defaults.batch_queue_depth),
            batch_concurrency: env_parse("BATCH_CONCURRENCY", defaults.batch_concurrency),
            failure_threshold: env_parse("FAILURE_THRESHOLD", defaults.failure_threshold),
            grace_period: Duration::from_secs(env_parse("GRACE_PERIOD_SECS", 5)),
            publish_interval: Duration::from_millis(env_parse("PUBLISH_INTERVAL_MS", 50)),
            heartbeat_interval: Duration::from_secs(env_parse("HEARTBEAT_INTERVAL_SECS", 10)),
            item_timeout: Duration::from_secs(env_parse("ITEM_TIMEOUT_SECS", 30)),
            retry_base_delay: defaults.retry_base_delay,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset.
///
/// Panics on a present-but-unparseable value: misconfiguration should
/// fail fast at startup.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be valid: {e}")),
        Err(_) => default,
    }
}
