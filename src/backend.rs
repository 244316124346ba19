//! Backend collaborator abstraction and its asynchronously initialized
//! handle.
//!
//! The [`Backend`] trait is the boundary to the component that actually
//! establishes tunnels (cryptography, packets, routing). [`BackendHandle`]
//! wraps the single backend instance behind a one-shot initialization task:
//! initialization starts eagerly, every [`BackendHandle::acquire`] caller
//! suspends on the same completion point, and a failure is cached for the
//! process lifetime.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::TunnelConfig;
use crate::registry::TunnelHandle;
use crate::types::Stage;

/// Tunnel state as reported (and requested) at the backend boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunState {
    Up,
    Down,
    /// Intermediate state the backend may report while a transition is in
    /// flight. Never valid as a requested state.
    Toggle,
}

impl From<TunState> for Stage {
    fn from(state: TunState) -> Stage {
        match state {
            TunState::Up => Stage::Connected,
            TunState::Down => Stage::Disconnected,
            TunState::Toggle => Stage::Waiting,
        }
    }
}

/// Raw traffic counters reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub total_rx: u64,
    pub total_tx: u64,
}

/// Failure reported by the backend during a transition or query.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("tunnel state change rejected: {0}")]
    StateChange(String),

    #[error("backend query failed: {0}")]
    Query(String),
}

/// Fatal backend initialization failure. One-shot: the first failure is
/// cached and returned to every subsequent caller, never retried.
#[derive(Debug, Clone, Error)]
#[error("backend initialization failed: {0}")]
pub struct BackendInitError(pub String);

/// External component performing actual tunnel establishment.
///
/// Implementations must serialize state mutations on a given tunnel handle;
/// the session layer inherits that ordering. State changes are reported
/// asynchronously through [`TunnelHandle::notify_state_change`], possibly
/// from backend-owned threads.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Request a state transition on `tunnel`, applying `config` when one is
    /// supplied.
    async fn set_state(
        &self,
        tunnel: &TunnelHandle,
        state: TunState,
        config: Option<&TunnelConfig>,
    ) -> Result<(), BackendError>;

    /// Current state of `tunnel`.
    async fn get_state(&self, tunnel: &TunnelHandle) -> Result<TunState, BackendError>;

    /// Traffic statistics for `tunnel`.
    async fn get_statistics(&self, tunnel: &TunnelHandle) -> Result<BackendStats, BackendError>;

    /// Names of tunnels currently running under this backend.
    async fn running_tunnel_names(&self) -> Vec<String>;
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Backend")
    }
}

type InitOutcome = Result<Arc<dyn Backend>, BackendInitError>;

/// Shared handle to the single backend instance.
///
/// Cloning is cheap; all clones observe the same initialization outcome.
#[derive(Clone)]
pub struct BackendHandle {
    rx: watch::Receiver<Option<InitOutcome>>,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle").finish_non_exhaustive()
    }
}

impl BackendHandle {
    /// Start the one-shot initialization task immediately and return the
    /// handle. Must be called from within a tokio runtime.
    pub fn spawn_init<F>(init: F) -> Self
    where
        F: Future<Output = InitOutcome> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let outcome = init.await;
            match &outcome {
                Ok(_) => info!("backend initialized"),
                Err(e) => error!(error = %e, "backend initialization failed"),
            }
            let _ = tx.send(Some(outcome));
        });
        BackendHandle { rx }
    }

    /// Wrap an already-initialized backend.
    pub fn ready(backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = watch::channel(Some(Ok(backend)));
        // The receiver retains the value after the sender is gone.
        drop(tx);
        BackendHandle { rx }
    }

    /// Suspend until initialization finishes, sharing the outcome with every
    /// concurrent waiter. Never blocks a thread; callers yield until the
    /// initialization task publishes its result.
    pub async fn acquire(&self) -> InitOutcome {
        let mut rx = self.rx.clone();
        let outcome = {
            let slot = rx
                .wait_for(|slot| slot.is_some())
                .await
                .map_err(|_| BackendInitError("initialization task abandoned".to_string()))?;
            Option::clone(&slot)
        };
        outcome.unwrap_or_else(|| Err(BackendInitError("initialization task abandoned".to_string())))
    }
}
