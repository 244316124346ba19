//! OS consent gating for VPN interface creation.
//!
//! Bringing a VPN interface up requires a one-time OS authorization. The
//! [`ConsentGate`] tracks that authorization for the session: it prompts
//! through a host collaborator when consent is missing, suspends the asking
//! flow until the host delivers the dialog outcome, and short-circuits once
//! consent has been granted.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::types::ConsentState;

/// Request code correlating consent dialog results delivered by the host.
/// Results carrying any other code are ignored.
pub const VPN_CONSENT_REQUEST_CODE: u32 = 10014;

/// Outcome of asking the platform whether a consent dialog is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentRequest {
    /// Consent is already satisfied; no dialog will be shown.
    AlreadyGranted,
    /// A dialog was handed to the host; the outcome arrives later through
    /// [`ConsentGate::record_result`].
    Prompted,
}

/// Host collaborator that can display the OS consent dialog.
#[async_trait]
pub trait ConsentPrompter: Send + Sync {
    async fn request_consent(&self) -> ConsentRequest;
}

struct GateInner {
    state: ConsentState,
    waiters: Vec<oneshot::Sender<bool>>,
}

/// Tracks VPN consent and suspends callers while the OS dialog is up.
pub struct ConsentGate {
    prompter: Arc<dyn ConsentPrompter>,
    inner: Mutex<GateInner>,
}

impl ConsentGate {
    pub fn new(prompter: Arc<dyn ConsentPrompter>) -> Self {
        ConsentGate {
            prompter,
            inner: Mutex::new(GateInner {
                state: ConsentState::Unknown,
                waiters: Vec::new(),
            }),
        }
    }

    /// Current consent state.
    pub fn state(&self) -> ConsentState {
        self.inner.lock().unwrap().state
    }

    pub fn is_granted(&self) -> bool {
        self.state() == ConsentState::Granted
    }

    /// Ensure consent has been granted, prompting through the host when
    /// needed.
    ///
    /// Suspends until the host reports the dialog outcome through
    /// [`ConsentGate::record_result`]. A denial is not cached: the next call
    /// prompts again, since the user may grant consent out-of-band. There is
    /// no timeout; a caller stays suspended until a result arrives or the
    /// gate is dropped.
    pub async fn ensure_consent(&self) -> ConsentState {
        // Register the waiter before prompting so a result racing the prompt
        // is not lost.
        let rx = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ConsentState::Granted {
                return ConsentState::Granted;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };

        match self.prompter.request_consent().await {
            ConsentRequest::AlreadyGranted => {
                self.settle(true);
                ConsentState::Granted
            }
            ConsentRequest::Prompted => {
                debug!("consent prompt issued, waiting for host result");
                match rx.await {
                    Ok(true) => ConsentState::Granted,
                    Ok(false) => ConsentState::DeniedPendingRetry,
                    // Host went away without delivering a result.
                    Err(_) => self.state(),
                }
            }
        }
    }

    /// Deliver a consent dialog outcome from the host.
    ///
    /// Results are matched strictly on `request_code`; anything other than
    /// [`VPN_CONSENT_REQUEST_CODE`] is ignored. Returns whether the result
    /// was consumed.
    pub fn record_result(&self, request_code: u32, granted: bool) -> bool {
        if request_code != VPN_CONSENT_REQUEST_CODE {
            debug!(request_code, "ignoring unrelated host callback");
            return false;
        }
        if granted {
            info!("VPN consent granted");
        } else {
            warn!("VPN consent denied");
        }
        self.settle(granted);
        true
    }

    fn settle(&self, granted: bool) {
        let waiters = {
            let mut inner = self.inner.lock().unwrap();
            if granted {
                inner.state = ConsentState::Granted;
            } else if inner.state != ConsentState::Granted {
                // Monotonic: an already-granted session never regresses.
                inner.state = ConsentState::DeniedPendingRetry;
            }
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(granted);
        }
    }
}
