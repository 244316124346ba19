//! Tunnel configuration descriptors, validation and assembly.
//!
//! Wire-level [`InterfaceDescriptor`] and [`PeerDescriptor`] values arrive
//! unvalidated from the embedder. [`assemble`] translates them into a
//! [`TunnelConfig`] with strongly typed fields, rejecting anything the
//! backend would refuse. Assembly is a pure function: no I/O, deterministic
//! for identical inputs, safe to call from any thread.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors detected while assembling a tunnel configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed private key")]
    MalformedPrivateKey,

    #[error("peer {0} is missing a public key")]
    MissingPublicKey(usize),

    #[error("peer {0} has a malformed public key")]
    MalformedPublicKey(usize),

    #[error("peer {0} has a malformed pre-shared key")]
    MalformedPresharedKey(usize),

    #[error("invalid interface address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid DNS server address: {0:?}")]
    InvalidDnsServer(String),

    #[error("peer {index} has an invalid endpoint: {value:?}")]
    InvalidEndpoint { index: usize, value: String },

    #[error("peer {index} has an invalid allowed-IP range: {value:?}")]
    InvalidAllowedIp { index: usize, value: String },
}

/// A 32-byte WireGuard key, created from its base64 wire form.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; 32]);

impl Key {
    /// Parse a key from its base64 encoding. Returns `None` unless the input
    /// decodes to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let bytes = BASE64.decode(encoded).ok()?;
        let raw: [u8; 32] = bytes.try_into().ok()?;
        Some(Key(raw))
    }

    pub fn from_bytes(raw: [u8; 32]) -> Self {
        Key(raw)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Key {
    // Keys may be secret; keep them out of debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// An IP address with a prefix length, e.g. `10.0.0.2/32`.
///
/// A bare address parses with the full prefix for its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpCidr {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl FromStr for IpCidr {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr = addr.parse::<IpAddr>().map_err(|_| ())?;
                let prefix = prefix.parse::<u8>().map_err(|_| ())?;
                (addr, prefix)
            }
            None => {
                let addr = s.parse::<IpAddr>().map_err(|_| ())?;
                let prefix = if addr.is_ipv4() { 32 } else { 128 };
                (addr, prefix)
            }
        };
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(());
        }
        Ok(IpCidr { addr, prefix })
    }
}

impl fmt::Display for IpCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// A peer endpoint as `host:port`. The host may be a name, an IPv4 address
/// or a bracketed IPv6 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl FromStr for Endpoint {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or(())?;
        let port = port.parse::<u16>().map_err(|_| ())?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(());
        }
        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Wire-level description of the local tunnel interface, prior to validation.
///
/// Absent optional fields are omitted from the assembled configuration, never
/// defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    /// Base64-encoded private key.
    pub private_key: String,

    /// Local addresses in CIDR notation.
    #[serde(default)]
    pub addresses: Vec<String>,

    /// DNS server addresses.
    #[serde(default)]
    pub dns_servers: Vec<String>,

    /// Application identifiers routed through the tunnel. Mutually exclusive
    /// with `excluded_apps` in effect; the backend enforces that at most one
    /// list is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_apps: Option<Vec<String>>,

    /// Application identifiers kept outside the tunnel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_apps: Option<Vec<String>>,
}

impl InterfaceDescriptor {
    pub fn new(private_key: impl Into<String>) -> Self {
        InterfaceDescriptor {
            private_key: private_key.into(),
            ..Default::default()
        }
    }

    pub fn with_addresses(mut self, addresses: Vec<String>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_dns_servers(mut self, dns_servers: Vec<String>) -> Self {
        self.dns_servers = dns_servers;
        self
    }

    pub fn with_included_apps(mut self, apps: Vec<String>) -> Self {
        self.included_apps = Some(apps);
        self
    }

    pub fn with_excluded_apps(mut self, apps: Vec<String>) -> Self {
        self.excluded_apps = Some(apps);
        self
    }
}

/// Wire-level description of one remote peer, prior to validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Base64-encoded public key. Required; validation rejects peers without
    /// one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Base64-encoded pre-shared key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,

    /// Remote endpoint as `host:port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Allowed IP ranges in CIDR notation.
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Persistent keepalive interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
}

impl PeerDescriptor {
    pub fn new(public_key: impl Into<String>) -> Self {
        PeerDescriptor {
            public_key: Some(public_key.into()),
            ..Default::default()
        }
    }

    pub fn with_preshared_key(mut self, key: impl Into<String>) -> Self {
        self.preshared_key = Some(key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_allowed_ips(mut self, allowed_ips: Vec<String>) -> Self {
        self.allowed_ips = allowed_ips;
        self
    }

    pub fn with_persistent_keepalive(mut self, seconds: u16) -> Self {
        self.persistent_keepalive = Some(seconds);
        self
    }
}

/// Validated interface half of a [`TunnelConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceSection {
    pub private_key: Key,
    pub addresses: Vec<IpCidr>,
    pub dns_servers: Vec<IpAddr>,
    /// Copied verbatim; identifier semantics are a backend concern.
    pub included_apps: Option<Vec<String>>,
    pub excluded_apps: Option<Vec<String>>,
}

/// Validated peer entry of a [`TunnelConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSection {
    pub public_key: Key,
    pub preshared_key: Option<Key>,
    pub endpoint: Option<Endpoint>,
    pub allowed_ips: Vec<IpCidr>,
    pub persistent_keepalive: Option<u16>,
}

/// A fully validated tunnel configuration: one interface plus its peers, in
/// descriptor order. Immutable once assembled; every `start` produces a fresh
/// one rather than merging with a prior configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelConfig {
    pub interface: InterfaceSection,
    pub peers: Vec<PeerSection>,
}

/// Assemble a [`TunnelConfig`] from wire-level descriptors.
pub fn assemble(
    interface: &InterfaceDescriptor,
    peers: &[PeerDescriptor],
) -> Result<TunnelConfig, ValidationError> {
    let private_key =
        Key::from_base64(&interface.private_key).ok_or(ValidationError::MalformedPrivateKey)?;

    let mut addresses = Vec::with_capacity(interface.addresses.len());
    for addr in &interface.addresses {
        let parsed = addr
            .parse::<IpCidr>()
            .map_err(|_| ValidationError::InvalidAddress(addr.clone()))?;
        addresses.push(parsed);
    }

    let mut dns_servers = Vec::with_capacity(interface.dns_servers.len());
    for server in &interface.dns_servers {
        let parsed = server
            .parse::<IpAddr>()
            .map_err(|_| ValidationError::InvalidDnsServer(server.clone()))?;
        dns_servers.push(parsed);
    }

    let interface = InterfaceSection {
        private_key,
        addresses,
        dns_servers,
        included_apps: interface.included_apps.clone(),
        excluded_apps: interface.excluded_apps.clone(),
    };

    let mut sections = Vec::with_capacity(peers.len());
    for (index, peer) in peers.iter().enumerate() {
        let public_key = match &peer.public_key {
            Some(encoded) => {
                Key::from_base64(encoded).ok_or(ValidationError::MalformedPublicKey(index))?
            }
            None => return Err(ValidationError::MissingPublicKey(index)),
        };

        let preshared_key = match &peer.preshared_key {
            Some(encoded) => Some(
                Key::from_base64(encoded).ok_or(ValidationError::MalformedPresharedKey(index))?,
            ),
            None => None,
        };

        let endpoint = match &peer.endpoint {
            Some(value) => Some(value.parse::<Endpoint>().map_err(|_| {
                ValidationError::InvalidEndpoint {
                    index,
                    value: value.clone(),
                }
            })?),
            None => None,
        };

        let mut allowed_ips = Vec::with_capacity(peer.allowed_ips.len());
        for range in &peer.allowed_ips {
            let parsed =
                range
                    .parse::<IpCidr>()
                    .map_err(|_| ValidationError::InvalidAllowedIp {
                        index,
                        value: range.clone(),
                    })?;
            allowed_ips.push(parsed);
        }

        sections.push(PeerSection {
            public_key,
            preshared_key,
            endpoint,
            allowed_ips,
            persistent_keepalive: peer.persistent_keepalive,
        });
    }

    Ok(TunnelConfig {
        interface,
        peers: sections,
    })
}
