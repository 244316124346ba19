//! On-disk tunnel profiles.
//!
//! A profile bundles everything `start` needs apart from the backend: the
//! tunnel name plus the interface and peer descriptors, stored as TOML.
//! Descriptors are persisted unvalidated; validation happens at assembly
//! time, so a stale profile fails at `start` rather than at load.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{InterfaceDescriptor, PeerDescriptor};

/// Errors that can occur while loading or saving a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize profile: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A named tunnel profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelProfile {
    pub name: String,
    pub interface: InterfaceDescriptor,
    #[serde(default)]
    pub peers: Vec<PeerDescriptor>,
}

impl TunnelProfile {
    /// Load a profile from a TOML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let raw = fs::read_to_string(path.as_ref())?;
        let profile: TunnelProfile = toml::from_str(&raw)?;
        info!(path = %path.as_ref().display(), tunnel = %profile.name, "loaded tunnel profile");
        Ok(profile)
    }

    /// Save the profile as TOML.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let raw = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), raw)?;
        info!(path = %path.as_ref().display(), tunnel = %self.name, "saved tunnel profile");
        Ok(())
    }
}
