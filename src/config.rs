use std::time::Duration;

use crate::{CasementError, RedisStore, TimeSource};

/// Environment variable holding the store URL, `redis://[:password@]host[:port][/db]`.
pub const REDIS_URL_ENV: &str = "LIMITER_REDIS_URL";

/// Optional environment variable with the number of pooled connection managers.
pub const REDIS_CONNECTIONS_ENV: &str = "LIMITER_REDIS_CONNECTIONS";

/// Optional environment variable with the script refresh interval in milliseconds.
pub const SCRIPT_REFRESH_MS_ENV: &str = "LIMITER_SCRIPT_REFRESH_MS";

/// Default interval between background checks that the admission script is still installed.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Connection and background-task settings for Redis-backed limiters.
///
/// # Examples
///
/// ```ignore
/// use casement::LimiterConfig;
///
/// // LIMITER_REDIS_URL=redis://:secret@127.0.0.1:6379/
/// let config = LimiterConfig::from_env()?;
/// let store = config.connect().await?;
/// ```
#[derive(Clone, Debug)]
pub struct LimiterConfig {
    /// Store URL, parsed by the `redis` crate.
    pub redis_url: String,

    /// Number of [`redis::aio::ConnectionManager`]s in the pool. Must be > 0.
    ///
    /// Defaults to 1: a manager already multiplexes concurrent requests.
    pub connection_count: usize,

    /// How often the background task re-checks the admission script.
    pub refresh_interval: Duration,

    /// Clock used to pick the current window.
    pub time_source: TimeSource,
}

impl LimiterConfig {
    /// Configuration for `redis_url` with every other setting at its default.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            connection_count: 1,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            time_source: TimeSource::default(),
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// Fails with [`CasementError::StoreUrlNotConfigured`] when
    /// `LIMITER_REDIS_URL` is unset or empty.
    pub fn from_env() -> Result<Self, CasementError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, CasementError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let redis_url = lookup(REDIS_URL_ENV)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                CasementError::StoreUrlNotConfigured(format!(
                    "please set {REDIS_URL_ENV} to point to a valid url"
                ))
            })?;

        let mut config = Self::new(redis_url);

        if let Some(raw) = lookup(REDIS_CONNECTIONS_ENV) {
            config.connection_count = parse_positive(REDIS_CONNECTIONS_ENV, &raw)? as usize;
        }

        if let Some(raw) = lookup(SCRIPT_REFRESH_MS_ENV) {
            config.refresh_interval =
                Duration::from_millis(parse_positive(SCRIPT_REFRESH_MS_ENV, &raw)?);
        }

        Ok(config)
    }

    /// Build a connected [`RedisStore`] from this configuration.
    ///
    /// A malformed URL is reported as [`CasementError::StoreUrlNotConfigured`],
    /// an unreachable server as [`CasementError::CannotConnect`].
    pub async fn connect(&self) -> Result<RedisStore, CasementError> {
        let client = redis::Client::open(self.redis_url.as_str()).map_err(|err| {
            CasementError::StoreUrlNotConfigured(format!("{REDIS_URL_ENV} is not a valid url: {err}"))
        })?;

        RedisStore::from_client(client, self.connection_count).await
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64, CasementError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(CasementError::InvalidConfig(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}
