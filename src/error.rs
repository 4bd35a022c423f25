/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum CasementError {
    /// The store connection URL is missing or cannot be parsed.
    #[error("store URL not configured: {0}")]
    StoreUrlNotConfigured(String),

    /// The store could not be reached while building a client.
    #[error("cannot connect to store: {0}")]
    CannotConnect(#[source] redis::RedisError),

    /// A limiter parameter failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An optional configuration setting holds an unusable value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The store does not know the admission script referenced by `0`.
    #[error("admission script {0} is not installed in the store")]
    ScriptMissing(String),

    /// The store acknowledged an upload under a different digest than expected.
    #[error("admission script digest mismatch: expected {expected}, store returned {actual}")]
    ScriptHashMismatch {
        /// Digest computed locally from the script source.
        expected: String,
        /// Digest reported by the store.
        actual: String,
    },

    /// The admission script replied with something other than 0 or 1.
    #[error("unexpected verdict from admission script: {0}")]
    UnexpectedVerdict(i64),

    /// Redis error.
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

impl CasementError {
    /// Whether this error means the store lost (or never had) the admission script.
    pub fn is_missing_script(&self) -> bool {
        matches!(self, CasementError::ScriptMissing(_))
    }
}
