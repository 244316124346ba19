//! Tunnel session orchestration façade.
//!
//! [`TunnelSession`] ties the pieces together: it gates operations on the
//! consent state, waits on the shared backend handle, assembles a validated
//! configuration per start, drives UP/DOWN transitions on the single registry
//! tunnel, and feeds backend state changes into the stage event bus. All
//! mutable session state lives in one struct owned by the session instance;
//! there are no ambient globals.
//!
//! `start` and `stop` return once the backend has accepted the transition
//! request. Terminal confirmation (`connected`, `disconnected`,
//! `wait_connection`) arrives asynchronously on the event stream.

use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendHandle, TunState};
use crate::config::{assemble, InterfaceDescriptor, PeerDescriptor, TunnelConfig};
use crate::consent::{ConsentGate, ConsentPrompter};
use crate::error::{SessionError, SessionResult};
use crate::events::{StageEventBus, StageSubscription};
use crate::registry::{TunnelHandle, TunnelRegistry};
use crate::types::{Stage, Stats, TunnelIdentity};

/// Mutable session fields, written only by session operations.
#[derive(Default)]
struct SessionState {
    identity: Option<TunnelIdentity>,
    /// Most recently assembled configuration; written by `start`, reused
    /// as-is by `stop`.
    last_config: Option<Arc<TunnelConfig>>,
}

/// Orchestrates the lifecycle of the single logical tunnel.
pub struct TunnelSession {
    backend: BackendHandle,
    consent: Arc<ConsentGate>,
    registry: TunnelRegistry,
    events: Arc<StageEventBus>,
    state: Mutex<SessionState>,
    /// Serializes start/stop transition bodies instead of relying solely on
    /// backend-internal ordering for overlapping requests.
    transition: AsyncMutex<()>,
}

impl TunnelSession {
    /// Create a session around a backend handle and a consent prompter.
    /// Must be called from within a tokio runtime.
    pub fn new(backend: BackendHandle, prompter: Arc<dyn ConsentPrompter>) -> Self {
        TunnelSession {
            backend,
            consent: Arc::new(ConsentGate::new(prompter)),
            registry: TunnelRegistry::new(),
            events: Arc::new(StageEventBus::new()),
            state: Mutex::new(SessionState::default()),
            transition: AsyncMutex::new(()),
        }
    }

    /// The consent gate, through which hosts deliver dialog results.
    pub fn consent(&self) -> &ConsentGate {
        &self.consent
    }

    /// Subscribe to stage events, replacing any prior subscriber.
    pub fn subscribe(&self) -> StageSubscription {
        self.events.subscribe()
    }

    /// Drop the current stage subscriber.
    pub fn unsubscribe(&self) {
        self.events.unsubscribe()
    }

    /// Last published stage, for late callers.
    pub fn stage(&self) -> Stage {
        self.events.last_stage()
    }

    /// Validate and adopt the tunnel name, then kick the consent flow in the
    /// background. Returns without waiting for the consent outcome.
    pub fn initialize(&self, name: &str) -> SessionResult<()> {
        let identity = TunnelIdentity::new(name)?;
        info!(tunnel = %identity, "initializing tunnel session");
        self.state.lock().unwrap().identity = Some(identity);
        self.spawn_consent_check();
        Ok(())
    }

    /// Assemble a configuration from the descriptors and request the UP
    /// transition.
    ///
    /// Fails with [`SessionError::PermissionDenied`] when consent is missing
    /// at call time, without touching the backend. Publishes `prepare` and
    /// `connecting`; the terminal stage arrives via the event stream once the
    /// backend reports it.
    pub async fn start(
        &self,
        name: &str,
        interface: &InterfaceDescriptor,
        peers: &[PeerDescriptor],
        provider_id: &str,
    ) -> SessionResult<()> {
        if !self.consent.is_granted() {
            // Re-kick the prompt so an out-of-band grant can land before the
            // caller retries.
            self.spawn_consent_check();
            warn!(tunnel = %name, "start refused: VPN consent not granted");
            return Err(SessionError::PermissionDenied);
        }

        let _transition = self.transition.lock().await;
        debug!(tunnel = %name, provider = %provider_id, "starting tunnel");
        self.events.publish(Stage::Preparing);

        let config = Arc::new(assemble(interface, peers)?);
        self.events.publish(Stage::Connecting);

        let backend = self.backend.acquire().await?;
        let tunnel = self.tunnel_handle(name);
        backend
            .set_state(&tunnel, TunState::Up, Some(&config))
            .await
            .map_err(|e| {
                error!(tunnel = %name, error = %e, "up transition rejected");
                e
            })?;

        self.state.lock().unwrap().last_config = Some(config);
        info!(tunnel = %name, "up transition accepted");
        Ok(())
    }

    /// Request the DOWN transition, reusing the most recently assembled
    /// configuration without re-validating it.
    ///
    /// Fails with [`SessionError::NotRunning`] when the backend reports no
    /// active tunnels; a `disconnected` stage is still published so observers
    /// converge on the actual state.
    pub async fn stop(&self, name: &str) -> SessionResult<()> {
        let _transition = self.transition.lock().await;
        let backend = self.backend.acquire().await?;

        if backend.running_tunnel_names().await.is_empty() {
            self.events.publish(Stage::Disconnected);
            warn!(tunnel = %name, "stop refused: no running tunnels");
            return Err(SessionError::NotRunning);
        }

        self.events.publish(Stage::Disconnecting);
        let tunnel = self.tunnel_handle(name);
        let config = self.state.lock().unwrap().last_config.clone();
        backend
            .set_state(&tunnel, TunState::Down, config.as_deref())
            .await
            .map_err(|e| {
                error!(tunnel = %name, error = %e, "down transition rejected");
                e
            })?;

        info!(tunnel = %name, "down transition accepted");
        Ok(())
    }

    /// Query the backend state directly, bypassing the callback path, and
    /// republish the mapped stage. Resynchronizes a late subscriber.
    pub async fn refresh_stage(&self, name: &str) -> SessionResult<()> {
        let backend = self.backend.acquire().await?;
        let tunnel = self.tunnel_handle(name);
        let state = backend.get_state(&tunnel).await?;
        debug!(tunnel = %name, state = ?state, "refreshed backend state");
        self.events.publish(Stage::from(state));
        Ok(())
    }

    /// Traffic counters for the tunnel, passed through from the backend
    /// unmodified.
    pub async fn get_stats(&self, name: &str) -> SessionResult<Stats> {
        let backend = self.backend.acquire().await?;
        let tunnel = self.tunnel_handle(name);
        let stats = backend.get_statistics(&tunnel).await?;
        Ok(Stats {
            bytes_received: stats.total_rx,
            bytes_sent: stats.total_tx,
        })
    }

    fn spawn_consent_check(&self) {
        let gate = self.consent.clone();
        tokio::spawn(async move {
            let outcome = gate.ensure_consent().await;
            debug!(state = ?outcome, "background consent check finished");
        });
    }

    /// Get or lazily create the registry tunnel, wiring backend state changes
    /// into the event bus. The wiring happens once; later calls reuse it.
    ///
    /// The identity adopted at `initialize` wins over the requested name,
    /// since the registry only ever hosts one tunnel.
    fn tunnel_handle(&self, requested: &str) -> Arc<TunnelHandle> {
        let name = {
            let state = self.state.lock().unwrap();
            state
                .identity
                .as_ref()
                .map(|identity| identity.as_str().to_string())
                .unwrap_or_else(|| requested.to_string())
        };
        let events = self.events.clone();
        self.registry.get_or_create(&name, move |state| {
            events.publish(Stage::from(state));
        })
    }
}
