//! Session orchestration for a single named WireGuard tunnel.
//!
//! This crate drives one logical VPN tunnel through its lifecycle: OS-level
//! consent, validated configuration assembly from interface/peer descriptors,
//! UP/DOWN transitions against an external [`backend::Backend`], and an
//! ordered stage event stream for observers. The WireGuard protocol itself
//! (cryptography, packet handling, routing) lives behind the backend trait;
//! consent dialogs and application enumeration live behind host collaborator
//! traits.
//!
//! The entry point is [`session::TunnelSession`]:
//!
//! - `initialize` validates the tunnel name and kicks the consent flow,
//! - `start` assembles a configuration and requests the UP transition,
//! - `stop` requests the DOWN transition,
//! - `refresh_stage` and `get_stats` are read-only queries,
//! - `subscribe` observes the ordered stage event stream.

pub mod apps;
pub mod backend;
pub mod config;
pub mod consent;
pub mod error;
pub mod events;
pub mod logging;
pub mod profile;
pub mod registry;
pub mod session;
pub mod types;

pub use backend::{Backend, BackendError, BackendHandle, BackendInitError, BackendStats, TunState};
pub use config::{assemble, InterfaceDescriptor, PeerDescriptor, TunnelConfig, ValidationError};
pub use consent::{ConsentGate, ConsentPrompter, ConsentRequest, VPN_CONSENT_REQUEST_CODE};
pub use error::{SessionError, SessionResult};
pub use events::{StageEventBus, StageSubscription};
pub use profile::TunnelProfile;
pub use registry::{TunnelHandle, TunnelRegistry};
pub use session::TunnelSession;
pub use types::{ConsentState, Stage, Stats, TunnelIdentity};
