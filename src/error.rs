//! Error types for tunnel session operations.

use thiserror::Error;

use crate::backend::{BackendError, BackendInitError};
use crate::config::ValidationError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by the public session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The tunnel name was rejected by the backend naming rules.
    #[error("invalid tunnel name: {0:?}")]
    InvalidName(String),

    /// OS-level VPN consent has not been granted.
    #[error("VPN permission not granted")]
    PermissionDenied,

    /// The interface or peer descriptors failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Backend initialization failed; the failure is permanent for this
    /// process lifetime.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendInitError),

    /// The backend rejected a transition or query.
    #[error("backend operation failed: {0}")]
    Backend(#[from] BackendError),

    /// Stop was requested while no tunnel is running.
    #[error("tunnel is not running")]
    NotRunning,
}
