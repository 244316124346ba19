//! Registry owning the single logical tunnel object.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::backend::TunState;

type StateCallback = Box<dyn Fn(TunState) + Send + Sync>;

/// Handle to the one logical tunnel, carrying its name and the state-change
/// callback registered at creation time.
pub struct TunnelHandle {
    name: String,
    on_state_change: StateCallback,
}

impl TunnelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoked by the backend, possibly from its own threads, when the tunnel
    /// state changes.
    pub fn notify_state_change(&self, state: TunState) {
        (self.on_state_change)(state);
    }
}

impl fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("name", &self.name)
            .finish()
    }
}

/// Owns the single [`TunnelHandle`] for the process lifetime.
#[derive(Default)]
pub struct TunnelRegistry {
    slot: Mutex<Option<Arc<TunnelHandle>>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        TunnelRegistry {
            slot: Mutex::new(None),
        }
    }

    /// Return the existing tunnel handle, creating it on first use.
    ///
    /// Only one handle ever exists; its callback is wired once, at creation.
    /// A later call with a different name keeps the original handle and its
    /// wiring. Switching identities mid-session is not supported and requires
    /// a teardown this layer does not model.
    pub fn get_or_create(
        &self,
        name: &str,
        on_state_change: impl Fn(TunState) + Send + Sync + 'static,
    ) -> Arc<TunnelHandle> {
        let mut slot = self.slot.lock().unwrap();
        if let Some(existing) = slot.as_ref() {
            if existing.name() != name {
                warn!(
                    requested = %name,
                    active = %existing.name(),
                    "tunnel identity switch requested; reusing the existing tunnel"
                );
            }
            return existing.clone();
        }

        info!(tunnel = %name, "creating tunnel handle");
        let handle = Arc::new(TunnelHandle {
            name: name.to_string(),
            on_state_change: Box::new(on_state_change),
        });
        *slot = Some(handle.clone());
        handle
    }

    /// The current handle, if one was created.
    pub fn current(&self) -> Option<Arc<TunnelHandle>> {
        self.slot.lock().unwrap().clone()
    }
}
