use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use async_channel::{Receiver, Sender};
use futures::future::{self, Either};

use crate::{AdmissionScript, CasementError, ScriptStore, runtime};

/// Where the registrar believes the admission script stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarState {
    /// No installation attempted yet.
    Uninstalled,
    /// The script was present or uploaded on the last successful check.
    Installed,
    /// The first installation attempt failed.
    ///
    /// Only the failed construction is affected; a new registrar starts over.
    Unavailable,
}

impl RegistrarState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RegistrarState::Installed,
            2 => RegistrarState::Unavailable,
            _ => RegistrarState::Uninstalled,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RegistrarState::Uninstalled => 0,
            RegistrarState::Installed => 1,
            RegistrarState::Unavailable => 2,
        }
    }
}

/// What [`ScriptRegistrar::ensure_installed`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptInstall {
    /// The store already had the script.
    AlreadyPresent,
    /// The script was missing and has been uploaded.
    Uploaded,
}

/// Keeps the admission script installed in a store.
///
/// Stores may drop cached scripts on restart or `SCRIPT FLUSH`, after which
/// invocation by digest fails. The registrar checks on demand and, through
/// [`spawn_refresh`](Self::spawn_refresh), on a fixed interval.
pub struct ScriptRegistrar<S> {
    store: Arc<S>,
    state: AtomicU8,
}

impl<S: ScriptStore> ScriptRegistrar<S> {
    /// Create a registrar in the [`RegistrarState::Uninstalled`] state.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: AtomicU8::new(RegistrarState::Uninstalled.as_u8()),
        }
    }

    /// Current state.
    pub fn state(&self) -> RegistrarState {
        RegistrarState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RegistrarState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Make sure the store has the admission script, uploading it if needed.
    ///
    /// On failure before the first success the state becomes
    /// [`RegistrarState::Unavailable`]. Once installed, failures leave the
    /// state untouched.
    pub async fn ensure_installed(&self) -> Result<ScriptInstall, CasementError> {
        match self.install().await {
            Ok(install) => {
                self.set_state(RegistrarState::Installed);
                Ok(install)
            }
            Err(err) => {
                if self.state() != RegistrarState::Installed {
                    self.set_state(RegistrarState::Unavailable);
                }
                Err(err)
            }
        }
    } // end method ensure_installed

    async fn install(&self) -> Result<ScriptInstall, CasementError> {
        let script = AdmissionScript::global();

        if self.store.script_exists(script.hash()).await? {
            return Ok(ScriptInstall::AlreadyPresent);
        }

        let actual = self.store.script_load(script.source()).await?;
        if !actual.eq_ignore_ascii_case(script.hash()) {
            return Err(CasementError::ScriptHashMismatch {
                expected: script.hash().to_string(),
                actual,
            });
        }

        Ok(ScriptInstall::Uploaded)
    }

    /// One background re-check. Errors are logged and swallowed.
    pub async fn refresh_once(&self) -> Option<ScriptInstall> {
        match self.ensure_installed().await {
            Ok(ScriptInstall::Uploaded) => {
                tracing::info!(
                    hash = AdmissionScript::global().hash(),
                    "admission script was missing from the store and has been re-installed"
                );
                Some(ScriptInstall::Uploaded)
            }
            Ok(ScriptInstall::AlreadyPresent) => Some(ScriptInstall::AlreadyPresent),
            Err(err) => {
                tracing::debug!(error = ?err, "admission script refresh failed, retrying next tick");
                None
            }
        }
    } // end method refresh_once

    /// Run [`refresh_once`](Self::refresh_once) every `interval` until the
    /// returned handle is cancelled or dropped.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> RefreshHandle {
        let (stop_tx, stop_rx) = async_channel::bounded::<()>(1);
        let registrar = Arc::clone(self);

        runtime::spawn_task(async move {
            registrar.refresh_loop(interval, stop_rx).await;
        });

        RefreshHandle { stop: stop_tx }
    }

    async fn refresh_loop(&self, interval: Duration, stop: Receiver<()>) {
        let mut interval = runtime::new_interval(interval);

        loop {
            let stopped = pin!(stop.recv());
            let ticked = pin!(runtime::tick(&mut interval));

            if let Either::Left(_) = future::select(stopped, ticked).await {
                break;
            }

            self.refresh_once().await;
        }

        tracing::trace!("admission script refresher stopped");
    } // end method refresh_loop
}

/// Stops a background refresher started by [`ScriptRegistrar::spawn_refresh`].
///
/// Dropping the handle stops the refresher as well.
#[derive(Debug)]
pub struct RefreshHandle {
    stop: Sender<()>,
}

impl RefreshHandle {
    /// Stop the refresher. Calling this more than once is harmless.
    pub fn cancel(&self) {
        self.stop.close();
    }

    /// Whether [`cancel`](Self::cancel) has been called or the handle dropped.
    pub fn is_cancelled(&self) -> bool {
        self.stop.is_closed()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.stop.close();
    }
}
