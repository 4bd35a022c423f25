use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};

use crate::CasementError;

/// Operations the limiter needs from the shared store.
///
/// Atomic increment and expiry are not listed here: they run inside the
/// admission script. Implementations must tolerate concurrent calls from the
/// admission path and the background refresher.
#[async_trait]
pub trait ScriptStore: Send + Sync + 'static {
    /// Whether a script with digest `hash` is currently cached by the store.
    async fn script_exists(&self, hash: &str) -> Result<bool, CasementError>;

    /// Upload `source` and return the digest the store registered it under.
    async fn script_load(&self, source: &str) -> Result<String, CasementError>;

    /// Run the script `hash` with `keys` as `KEYS` and `args` as `ARGV`.
    ///
    /// Returns [`CasementError::ScriptMissing`] when the store does not know `hash`.
    async fn eval_sha(
        &self,
        hash: &str,
        keys: &[String],
        args: &[i64],
    ) -> Result<i64, CasementError>;
}

/// A round-robin set of [`redis::aio::ConnectionManager`]s.
///
/// Each manager multiplexes requests and reconnects on its own; several
/// managers spread load when many limiters share one store.
#[derive(Debug)]
pub struct RedisStore {
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl RedisStore {
    /// Connect with a single [`ConnectionManager`].
    pub async fn default_from_client(client: Client) -> Result<Self, CasementError> {
        Self::from_client(client, 1).await
    }

    /// Connect `connection_count` managers and verify the store answers `PING`.
    pub async fn from_client(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, CasementError> {
        if connection_count == 0 {
            return Err(CasementError::InvalidConfig(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            let manager = client
                .get_connection_manager()
                .await
                .map_err(CasementError::CannotConnect)?;
            connection_managers.push(manager);
        }

        let store = Self {
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        };

        let mut connection_manager = store.get();
        let _: String = redis::cmd("PING")
            .query_async(&mut connection_manager)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "store did not answer PING");
                CasementError::CannotConnect(err)
            })?;

        Ok(store)
    }

    /// Wrap an existing connection manager without probing it.
    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_managers: Arc::new(vec![connection_manager]),
            track_index: AtomicUsize::new(0),
        }
    }

    pub(crate) fn get(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method get
} // end impl RedisStore

impl Clone for RedisStore {
    fn clone(&self) -> Self {
        Self {
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ScriptStore for RedisStore {
    async fn script_exists(&self, hash: &str) -> Result<bool, CasementError> {
        let mut connection_manager = self.get();

        let exists: Vec<bool> = redis::cmd("SCRIPT")
            .arg("EXISTS")
            .arg(hash)
            .query_async(&mut connection_manager)
            .await?;

        Ok(exists.first().copied().unwrap_or(false))
    }

    async fn script_load(&self, source: &str) -> Result<String, CasementError> {
        let mut connection_manager = self.get();

        let hash: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query_async(&mut connection_manager)
            .await?;

        Ok(hash)
    }

    async fn eval_sha(
        &self,
        hash: &str,
        keys: &[String],
        args: &[i64],
    ) -> Result<i64, CasementError> {
        let mut connection_manager = self.get();

        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(hash).arg(keys.len());
        for key in keys {
            cmd.arg(key.as_str());
        }
        for arg in args {
            cmd.arg(*arg);
        }

        let reply: Result<i64, redis::RedisError> = cmd.query_async(&mut connection_manager).await;

        match reply {
            Ok(verdict) => Ok(verdict),
            Err(err) if err.kind() == redis::ErrorKind::Server(redis::ServerErrorKind::NoScript) => {
                Err(CasementError::ScriptMissing(hash.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
