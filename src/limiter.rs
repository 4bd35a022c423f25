//! Fixed-window limiter bound to one subject.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    AdmissionScript, CasementError, LimiterConfig, LimiterKey, RedisStore, RefreshHandle,
    RegistrarState, ScriptRegistrar, ScriptStore, TimeSource, Verdict, WindowDurationSeconds,
    WindowLimit, config::DEFAULT_REFRESH_INTERVAL, runtime, window_key,
};

/// Parameters of a single [`Limiter`].
#[derive(Clone, Debug)]
pub struct LimiterOptions {
    /// Subject being rate limited (user, token, route, ...).
    pub key: LimiterKey,
    /// Admissions allowed per window.
    pub limit: WindowLimit,
    /// Window length.
    pub duration: WindowDurationSeconds,
    /// Interval of the background script re-check.
    pub refresh_interval: Duration,
    /// Clock used to pick the current window.
    pub time_source: TimeSource,
}

impl LimiterOptions {
    /// Validate raw parameters; other settings take their defaults.
    pub fn new(limit: i64, duration: i64, key: impl Into<String>) -> Result<Self, CasementError> {
        Ok(Self {
            key: LimiterKey::try_from(key.into()).map_err(invalid_argument)?,
            limit: WindowLimit::try_from(limit).map_err(invalid_argument)?,
            duration: WindowDurationSeconds::try_from(duration).map_err(invalid_argument)?,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            time_source: TimeSource::default(),
        })
    }
}

fn invalid_argument(reason: &'static str) -> CasementError {
    CasementError::InvalidArgument(reason.to_string())
}

/// Point-in-time copy of a limiter's decision counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimiterStats {
    /// Calls admitted on an explicit allow verdict.
    pub admitted: u64,
    /// Calls denied on an explicit deny verdict.
    pub denied: u64,
    /// Calls admitted because the store could not give a verdict.
    pub failed_open: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    denied: AtomicU64,
    failed_open: AtomicU64,
}

/// Distributed fixed-window rate limiter for one subject.
///
/// All processes that build a limiter with the same key, limit and duration
/// against the same store share one counter per window. The decision runs
/// atomically inside the store; this type does no local locking and is safe
/// to call concurrently.
///
/// # Fail-open
///
/// [`allow`](Self::allow) admits whenever the store cannot produce a verdict
/// (unreachable, timed out, script missing, protocol error). Those calls are
/// logged at `warn` and counted in [`LimiterStats::failed_open`].
///
/// # Examples
///
/// ```ignore
/// use casement::Limiter;
///
/// // LIMITER_REDIS_URL=redis://127.0.0.1:6379/
/// let limiter = Limiter::new(100, 60, "user_123").await?;
///
/// if limiter.allow().await {
///     // proceed
/// } else {
///     // reply 429
/// }
/// ```
pub struct Limiter<S = RedisStore> {
    store: Arc<S>,
    key: LimiterKey,
    keys: Vec<String>,
    limit: WindowLimit,
    duration: WindowDurationSeconds,
    time_source: TimeSource,
    registrar: Arc<ScriptRegistrar<S>>,
    refresh: RefreshHandle,
    counters: Counters,
}

impl Limiter<RedisStore> {
    /// Connect using `LIMITER_*` environment settings and build a limiter.
    ///
    /// Fails if the store URL is missing or malformed, the store is
    /// unreachable, or the admission script cannot be installed.
    pub async fn new(limit: i64, duration: i64, key: impl Into<String>) -> Result<Self, CasementError> {
        let config = LimiterConfig::from_env()?;
        Self::from_config(&config, limit, duration, key).await
    }

    /// Like [`new`](Self::new) with an explicit configuration.
    pub async fn from_config(
        config: &LimiterConfig,
        limit: i64,
        duration: i64,
        key: impl Into<String>,
    ) -> Result<Self, CasementError> {
        let mut options = LimiterOptions::new(limit, duration, key)?;
        options.refresh_interval = config.refresh_interval;
        options.time_source = config.time_source;

        let store = config.connect().await?;

        Self::with_store(Arc::new(store), options).await
    }
}

impl<S: ScriptStore> Limiter<S> {
    /// Build a limiter on an existing store, which may be shared.
    ///
    /// Installs the admission script before returning and starts the
    /// background re-check.
    pub async fn with_store(store: Arc<S>, options: LimiterOptions) -> Result<Self, CasementError> {
        let registrar = Arc::new(ScriptRegistrar::new(Arc::clone(&store)));

        if let Err(err) = registrar.ensure_installed().await {
            tracing::error!(key = %options.key, error = ?err, "failed to install admission script");
            return Err(err);
        }

        let refresh = registrar.spawn_refresh(options.refresh_interval);

        Ok(Self {
            store,
            keys: vec![options.key.to_string()],
            key: options.key,
            limit: options.limit,
            duration: options.duration,
            time_source: options.time_source,
            registrar,
            refresh,
            counters: Counters::default(),
        })
    }

    /// Consume one admission in the current window.
    ///
    /// Returns `false` only when the store explicitly reports the limit as
    /// exceeded. One round trip, no retries.
    pub async fn allow(&self) -> bool {
        let now = match self.time_source {
            TimeSource::Store => None,
            TimeSource::Local => Some(runtime::unix_now_seconds()),
        };

        let result = AdmissionScript::global()
            .check(&*self.store, &self.keys, self.limit, self.duration, now)
            .await;

        match result {
            Ok(Verdict::Allow) => {
                self.counters.admitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(Verdict::Deny) => {
                self.counters.denied.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(err) => {
                self.counters.failed_open.fetch_add(1, Ordering::Relaxed);

                if err.is_missing_script() {
                    tracing::warn!(
                        key = %self.key,
                        "admission script missing from store, failing open until it is re-installed"
                    );
                } else {
                    tracing::warn!(key = %self.key, error = ?err, "admission check failed, failing open");
                }

                true
            }
        }
    } // end method allow

    /// Decision counters since construction.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            denied: self.counters.denied.load(Ordering::Relaxed),
            failed_open: self.counters.failed_open.load(Ordering::Relaxed),
        }
    }

    /// Stop the background script re-check.
    ///
    /// [`allow`](Self::allow) keeps working but no longer recovers from a
    /// store that lost the script. Dropping the limiter has the same effect.
    pub fn shutdown(&self) {
        self.refresh.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.refresh.is_cancelled()
    }

    /// State of this limiter's script registrar.
    pub fn registrar_state(&self) -> RegistrarState {
        self.registrar.state()
    }

    /// Store key of this limiter's counter for the window containing `now_seconds`.
    pub fn current_bucket_key(&self, now_seconds: i64) -> String {
        window_key::bucket_identity(&self.key, *self.duration, now_seconds)
    }

    /// The rate-limited subject.
    pub fn key(&self) -> &LimiterKey {
        &self.key
    }

    /// Admissions allowed per window.
    pub fn limit(&self) -> WindowLimit {
        self.limit
    }

    /// Window length.
    pub fn duration(&self) -> WindowDurationSeconds {
        self.duration
    }

    /// The store this limiter talks to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
