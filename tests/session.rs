//! End-to-end tests for the tunnel session façade against a recording fake
//! backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wg_session::config::Key;
use wg_session::consent::{ConsentRequest, VPN_CONSENT_REQUEST_CODE};
use wg_session::{
    Backend, BackendError, BackendHandle, BackendInitError, BackendStats, ConsentPrompter,
    InterfaceDescriptor, PeerDescriptor, SessionError, Stage, TunState, TunnelConfig,
    TunnelHandle, TunnelSession,
};

/// Backend that records every call and reports UP/DOWN through the tunnel
/// callback as soon as a transition is requested.
#[derive(Default)]
struct RecordingBackend {
    /// (tunnel name, requested state, config supplied)
    set_state_calls: Mutex<Vec<(String, TunState, bool)>>,
    running: Mutex<Vec<String>>,
    reported_state: Mutex<Option<TunState>>,
    stats: Mutex<BackendStats>,
}

impl RecordingBackend {
    fn with_running(names: &[&str]) -> Self {
        let backend = RecordingBackend::default();
        *backend.running.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
        backend
    }

    fn with_state(state: TunState) -> Self {
        let backend = RecordingBackend::default();
        *backend.reported_state.lock().unwrap() = Some(state);
        backend
    }

    fn with_stats(stats: BackendStats) -> Self {
        let backend = RecordingBackend::default();
        *backend.stats.lock().unwrap() = stats;
        backend
    }

    fn calls(&self) -> Vec<(String, TunState, bool)> {
        self.set_state_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn set_state(
        &self,
        tunnel: &TunnelHandle,
        state: TunState,
        config: Option<&TunnelConfig>,
    ) -> Result<(), BackendError> {
        self.set_state_calls.lock().unwrap().push((
            tunnel.name().to_string(),
            state,
            config.is_some(),
        ));
        match state {
            TunState::Up => self
                .running
                .lock()
                .unwrap()
                .push(tunnel.name().to_string()),
            TunState::Down => self.running.lock().unwrap().clear(),
            TunState::Toggle => {}
        }
        *self.reported_state.lock().unwrap() = Some(state);
        tunnel.notify_state_change(state);
        Ok(())
    }

    async fn get_state(&self, _tunnel: &TunnelHandle) -> Result<TunState, BackendError> {
        Ok(self.reported_state.lock().unwrap().unwrap_or(TunState::Down))
    }

    async fn get_statistics(&self, _tunnel: &TunnelHandle) -> Result<BackendStats, BackendError> {
        Ok(*self.stats.lock().unwrap())
    }

    async fn running_tunnel_names(&self) -> Vec<String> {
        self.running.lock().unwrap().clone()
    }
}

/// Prompter for hosts where consent is already satisfied.
struct SatisfiedPrompter;

#[async_trait]
impl ConsentPrompter for SatisfiedPrompter {
    async fn request_consent(&self) -> ConsentRequest {
        ConsentRequest::AlreadyGranted
    }
}

/// Prompter whose dialog is never answered.
struct UnansweredPrompter;

#[async_trait]
impl ConsentPrompter for UnansweredPrompter {
    async fn request_consent(&self) -> ConsentRequest {
        ConsentRequest::Prompted
    }
}

fn key(fill: u8) -> String {
    Key::from_bytes([fill; 32]).to_base64()
}

fn descriptors() -> (InterfaceDescriptor, Vec<PeerDescriptor>) {
    let interface = InterfaceDescriptor::new(key(1))
        .with_addresses(vec!["10.0.0.2/32".to_string()])
        .with_dns_servers(vec!["1.1.1.1".to_string()]);
    let peers = vec![PeerDescriptor::new(key(2))
        .with_endpoint("vpn.example.com:51820")
        .with_allowed_ips(vec!["0.0.0.0/0".to_string()])
        .with_persistent_keepalive(25)];
    (interface, peers)
}

async fn granted_session(backend: Arc<RecordingBackend>) -> TunnelSession {
    let session = TunnelSession::new(
        BackendHandle::ready(backend),
        Arc::new(SatisfiedPrompter),
    );
    session.consent().ensure_consent().await;
    session
}

#[tokio::test]
async fn start_without_consent_fails_and_touches_nothing() {
    let backend = Arc::new(RecordingBackend::default());
    let session = TunnelSession::new(
        BackendHandle::ready(backend.clone()),
        Arc::new(UnansweredPrompter),
    );
    session.initialize("wg0").unwrap();

    let (interface, peers) = descriptors();
    let result = session.start("wg0", &interface, &peers, "org.example.host").await;

    assert!(matches!(result, Err(SessionError::PermissionDenied)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn consent_result_delivered_through_the_session_unblocks_start() {
    let backend = Arc::new(RecordingBackend::default());
    let session = TunnelSession::new(
        BackendHandle::ready(backend.clone()),
        Arc::new(UnansweredPrompter),
    );
    session.initialize("wg0").unwrap();
    session
        .consent()
        .record_result(VPN_CONSENT_REQUEST_CODE, true);

    let (interface, peers) = descriptors();
    session
        .start("wg0", &interface, &peers, "org.example.host")
        .await
        .unwrap();
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn successful_start_publishes_the_stage_sequence() {
    let backend = Arc::new(RecordingBackend::default());
    let session = granted_session(backend.clone()).await;
    session.initialize("wg0").unwrap();

    let mut sub = session.subscribe();
    let (interface, peers) = descriptors();
    session
        .start("wg0", &interface, &peers, "org.example.host")
        .await
        .unwrap();

    assert_eq!(sub.next().await.unwrap().as_str(), "prepare");
    assert_eq!(sub.next().await.unwrap().as_str(), "connecting");
    assert_eq!(sub.next().await.unwrap().as_str(), "connected");

    let calls = backend.calls();
    assert_eq!(calls, vec![("wg0".to_string(), TunState::Up, true)]);
    assert_eq!(session.stage(), Stage::Connected);
}

#[tokio::test]
async fn invalid_name_is_rejected_before_any_work() {
    let backend = Arc::new(RecordingBackend::default());
    let session = granted_session(backend.clone()).await;

    for name in ["", "way-too-long-tunnel-name", "bad/name"] {
        match session.initialize(name) {
            Err(SessionError::InvalidName(rejected)) => assert_eq!(rejected, name),
            other => panic!("expected InvalidName for {name:?}, got {other:?}"),
        }
    }
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn validation_failure_surfaces_and_skips_the_backend() {
    let backend = Arc::new(RecordingBackend::default());
    let session = granted_session(backend.clone()).await;
    session.initialize("wg0").unwrap();

    let (interface, _) = descriptors();
    let keyless_peer = vec![PeerDescriptor::default()];
    let result = session
        .start("wg0", &interface, &keyless_peer, "org.example.host")
        .await;

    assert!(matches!(result, Err(SessionError::Validation(_))));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn stop_with_no_running_tunnels_fails_but_publishes_disconnected() {
    let backend = Arc::new(RecordingBackend::default());
    let session = granted_session(backend.clone()).await;
    session.initialize("wg0").unwrap();

    let mut sub = session.subscribe();
    let result = session.stop("wg0").await;

    assert!(matches!(result, Err(SessionError::NotRunning)));
    assert_eq!(sub.next().await, Some(Stage::Disconnected));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn stop_reuses_the_last_assembled_config() {
    let backend = Arc::new(RecordingBackend::default());
    let session = granted_session(backend.clone()).await;
    session.initialize("wg0").unwrap();

    let (interface, peers) = descriptors();
    session
        .start("wg0", &interface, &peers, "org.example.host")
        .await
        .unwrap();
    session.stop("wg0").await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1, TunState::Down);
    // The config assembled by start travels along on the way down.
    assert!(calls[1].2);
}

#[tokio::test]
async fn full_cycle_publishes_both_transitions_in_order() {
    let backend = Arc::new(RecordingBackend::default());
    let session = granted_session(backend.clone()).await;
    session.initialize("wg0").unwrap();

    let mut sub = session.subscribe();
    let (interface, peers) = descriptors();
    session
        .start("wg0", &interface, &peers, "org.example.host")
        .await
        .unwrap();
    session.stop("wg0").await.unwrap();

    let expected = ["prepare", "connecting", "connected", "disconnecting", "disconnected"];
    for stage in expected {
        assert_eq!(sub.next().await.unwrap().as_str(), stage);
    }
}

#[tokio::test]
async fn stats_pass_through_unmodified() {
    let backend = Arc::new(RecordingBackend::with_stats(BackendStats {
        total_rx: 1024,
        total_tx: 2048,
    }));
    let session = granted_session(backend).await;
    session.initialize("wg0").unwrap();

    let stats = session.get_stats("wg0").await.unwrap();
    assert_eq!(stats.bytes_received, 1024);
    assert_eq!(stats.bytes_sent, 2048);
}

#[tokio::test]
async fn refresh_stage_maps_backend_states_like_the_callback_path() {
    for (state, expected) in [
        (TunState::Up, Stage::Connected),
        (TunState::Down, Stage::Disconnected),
        (TunState::Toggle, Stage::Waiting),
    ] {
        let backend = Arc::new(RecordingBackend::with_state(state));
        let session = granted_session(backend).await;
        session.initialize("wg0").unwrap();

        let mut sub = session.subscribe();
        session.refresh_stage("wg0").await.unwrap();
        assert_eq!(sub.next().await, Some(expected));
    }
}

#[tokio::test]
async fn failed_backend_initialization_poisons_every_operation() {
    let handle = BackendHandle::spawn_init(async {
        Err(BackendInitError("driver missing".to_string()))
    });
    let session = TunnelSession::new(handle, Arc::new(SatisfiedPrompter));
    session.consent().ensure_consent().await;
    session.initialize("wg0").unwrap();

    let stats = session.get_stats("wg0").await;
    assert!(matches!(stats, Err(SessionError::BackendUnavailable(_))));

    let (interface, peers) = descriptors();
    let start = session.start("wg0", &interface, &peers, "org.example.host").await;
    assert!(matches!(start, Err(SessionError::BackendUnavailable(_))));

    let refresh = session.refresh_stage("wg0").await;
    assert!(matches!(refresh, Err(SessionError::BackendUnavailable(_))));
}

#[tokio::test]
async fn stop_with_another_tunnel_running_requests_down() {
    // The backend reports a running tunnel even though this session never
    // started one; stop still drives the DOWN transition.
    let backend = Arc::new(RecordingBackend::with_running(&["wg0"]));
    let session = granted_session(backend.clone()).await;
    session.initialize("wg0").unwrap();

    session.stop("wg0").await.unwrap();
    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, TunState::Down);
    // No config was ever assembled, so none is supplied.
    assert!(!calls[0].2);
}
