use std::{ops::Deref, sync::Arc};

/// Maximum number of admissions per window.
///
/// Must be at least 1. The admission script denies once a bucket counter
/// goes past this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowLimit(pub(crate) i64);

impl WindowLimit {
    /// Effectively unlimited: no window ever counts past it.
    pub const MAX: WindowLimit = WindowLimit(i64::MAX);
}

impl Deref for WindowLimit {
    type Target = i64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<i64> for WindowLimit {
    type Error = &'static str;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Window limit must be at least 1")
        } else {
            Ok(Self(value))
        }
    }
}

/// Fixed window length in whole seconds.
///
/// Must be between 1 and [`WindowDurationSeconds::MAX`]; the bucket index is
/// `now / duration`. The upper bound keeps the value an exact integer inside
/// the store's Lua numbers and a valid `EXPIRE` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowDurationSeconds(pub(crate) i64);

impl WindowDurationSeconds {
    /// Longest accepted window, `i32::MAX` seconds (about 68 years).
    pub const MAX: WindowDurationSeconds = WindowDurationSeconds(i32::MAX as i64);
}

impl Deref for WindowDurationSeconds {
    type Target = i64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<i64> for WindowDurationSeconds {
    type Error = &'static str;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Window duration must be at least 1")
        } else if value > Self::MAX.0 {
            Err("Window duration must not exceed i32::MAX seconds")
        } else {
            Ok(Self(value))
        }
    }
}

/// A validated newtype for the rate-limited subject.
///
/// Constraints:
/// - Must not be empty
/// - Must not be longer than 512 bytes
///
/// Colons are allowed: the two trailing segments of a bucket identity are
/// always integers, so the subject is recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LimiterKey(Arc<str>);

impl Deref for LimiterKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LimiterKey {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err("Limiter key must not be empty")
        } else if value.len() > 512 {
            Err("Limiter key must not be longer than 512 bytes")
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for LimiterKey {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Which clock supplies `now` for bucket selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeSource {
    /// The admission script reads the store's own clock (`TIME`).
    ///
    /// All callers agree on bucket boundaries regardless of local clock skew.
    #[default]
    Store,
    /// The caller passes its local Unix time in seconds.
    Local,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every counter stayed within the limit.
    Allow,
    /// At least one counter went past the limit.
    Deny,
}

impl TryFrom<i64> for Verdict {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Verdict::Allow),
            1 => Ok(Verdict::Deny),
            other => Err(other),
        }
    }
}
