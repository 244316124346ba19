//! Installed-application listing for per-app tunneling UIs.
//!
//! Per-app tunneling needs the set of installed applications to offer as
//! include/exclude candidates. The platform enumeration itself is an opaque
//! external query behind [`AppDirectory`]; this module applies the two rules
//! the session layer guarantees: the host application never appears in the
//! result, and an icon that fails to load degrades to an absent icon instead
//! of failing the whole query.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// An application available for per-app tunneling, with an optional encoded
/// icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    pub name: String,
    pub identifier: String,
    pub icon: Option<Vec<u8>>,
}

/// Failure to extract an application icon. Never fails the listing; the
/// affected entry simply carries no icon.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("icon extraction failed: {0}")]
pub struct IconError(pub String);

/// Raw application record as reported by the platform.
#[derive(Debug, Clone)]
pub struct AppRecord {
    pub name: String,
    pub identifier: String,
    pub icon: Result<Vec<u8>, IconError>,
}

/// Platform collaborator enumerating installed applications.
#[async_trait]
pub trait AppDirectory: Send + Sync {
    /// Identifier of the hosting application itself.
    fn host_identifier(&self) -> String;

    /// All applications known to the platform, including the host.
    async fn applications(&self) -> Vec<AppRecord>;
}

/// List installed applications, excluding the host application and degrading
/// icon failures to an absent icon.
pub async fn list_installed_apps(directory: &dyn AppDirectory) -> Vec<InstalledApp> {
    let host = directory.host_identifier();
    directory
        .applications()
        .await
        .into_iter()
        .filter(|record| record.identifier != host)
        .map(|record| {
            let icon = match record.icon {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    debug!(app = %record.identifier, error = %e, "dropping unloadable icon");
                    None
                }
            };
            InstalledApp {
                name: record.name,
                identifier: record.identifier,
                icon,
            }
        })
        .collect()
}
