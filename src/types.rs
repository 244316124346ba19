//! Core value types for tunnel sessions.

use std::fmt;

use crate::error::SessionError;

/// Maximum tunnel name length accepted by the WireGuard backend.
const NAME_MAX_LEN: usize = 15;

/// A validated tunnel name, unique per process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunnelIdentity(String);

impl TunnelIdentity {
    /// Validate `name` against the backend naming rules: 1 to 15 characters
    /// drawn from `[A-Za-z0-9_=+.-]`.
    pub fn new(name: &str) -> Result<Self, SessionError> {
        if is_valid_name(name) {
            Ok(TunnelIdentity(name.to_string()))
        } else {
            Err(SessionError::InvalidName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TunnelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `name` is acceptable to the backend as a tunnel name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= NAME_MAX_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'=' | b'+' | b'.' | b'-'))
}

/// Externally observable lifecycle phase of the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preparing,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    /// The backend reported an intermediate state while a transition is in
    /// flight.
    Waiting,
    Unknown,
}

impl Stage {
    /// Wire string delivered to the event-stream sink.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Preparing => "prepare",
            Stage::Connecting => "connecting",
            Stage::Connected => "connected",
            Stage::Disconnecting => "disconnecting",
            Stage::Disconnected => "disconnected",
            Stage::Waiting => "wait_connection",
            Stage::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OS-level VPN consent, tracked per session.
///
/// Monotonic toward [`ConsentState::Granted`]: once granted it never
/// regresses. A denial is not cached negatively; every attempt re-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsentState {
    #[default]
    Unknown,
    Granted,
    DeniedPendingRetry,
}

/// Traffic counters for one tunnel instance, passed through from the backend
/// unmodified. Counters reset only when a new tunnel instance is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
}
