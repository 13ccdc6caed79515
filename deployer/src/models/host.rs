//! Host descriptor models

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable identity of a host entry
pub type HostId = u64;

/// Services that can be provisioned onto a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {
    /// AdGuard Home DNS ad-blocker
    AdGuard,
    /// Pi-hole DNS ad-blocker
    PiHole,
    /// n8n workflow automation
    N8n,
    /// Homarr dashboard
    Homarr,
    /// Dashy dashboard
    Dashy,
    /// Crafty Controller game-server manager
    Crafty,
    /// Portainer container manager
    Portainer,
    /// Any name not in the catalog
    Unknown,
}

impl Service {
    /// Every service the catalog knows how to install
    pub const ALL: [Service; 7] = [
        Service::AdGuard,
        Service::PiHole,
        Service::N8n,
        Service::Homarr,
        Service::Dashy,
        Service::Crafty,
        Service::Portainer,
    ];

    /// Parse a service name, case-insensitively. Unrecognized names map to `Unknown`.
    pub fn parse(name: &str) -> Service {
        match name.trim().to_lowercase().as_str() {
            "adguard" | "adguardhome" | "adguard-home" => Service::AdGuard,
            "pihole" | "pi-hole" => Service::PiHole,
            "n8n" => Service::N8n,
            "homarr" => Service::Homarr,
            "dashy" => Service::Dashy,
            "crafty" | "crafty-controller" => Service::Crafty,
            "portainer" => Service::Portainer,
            _ => Service::Unknown,
        }
    }

    /// Canonical key used in files and on the wire
    pub fn key(&self) -> &'static str {
        match self {
            Service::AdGuard => "adguard",
            Service::PiHole => "pihole",
            Service::N8n => "n8n",
            Service::Homarr => "homarr",
            Service::Dashy => "dashy",
            Service::Crafty => "crafty",
            Service::Portainer => "portainer",
            Service::Unknown => "unknown",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Service::AdGuard => "AdGuard",
            Service::PiHole => "Pi-hole",
            Service::N8n => "n8n",
            Service::Homarr => "Homarr",
            Service::Dashy => "Dashy",
            Service::Crafty => "Crafty Controller",
            Service::Portainer => "Portainer",
            Service::Unknown => "unknown service",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for Service {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Service {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Service::parse(&s))
    }
}

/// Operating system classification of a target host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Windows,
    Unknown,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsFamily::Linux => write!(f, "Linux"),
            OsFamily::Windows => write!(f, "Windows"),
            OsFamily::Unknown => write!(f, "unknown"),
        }
    }
}

/// A target host entered by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDescriptor {
    /// Unique, never reused identity
    pub id: HostId,

    /// IPv4 address or hostname
    pub address: String,

    /// Login user
    #[serde(default)]
    pub user: String,

    /// Password, or path to a private key file
    #[serde(
        default = "empty_secret",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub secret: SecretString,

    /// Service selected for this host
    #[serde(default)]
    pub service: Option<Service>,
}

impl HostDescriptor {
    pub fn new(
        id: HostId,
        address: impl Into<String>,
        user: impl Into<String>,
        secret: impl Into<String>,
        service: Option<Service>,
    ) -> Self {
        Self {
            id,
            address: address.into(),
            user: user.into(),
            secret: SecretString::from(secret.into()),
            service,
        }
    }

    /// Whether a non-empty secret was provided
    pub fn has_secret(&self) -> bool {
        !self.secret.expose_secret().is_empty()
    }

    /// Short label used in progress messages and logs
    pub fn label(&self) -> String {
        format!("#{} {}", self.id, self.address)
    }
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}
