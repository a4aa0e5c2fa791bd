//! Configuration surface consumed by the external loader.
//!
//! Field names follow the JSON convention of the host runtime
//! (`publicName`, `certFile`, ...). Build methods validate and convert the
//! raw file structures into the runtime types the proxy handlers consume.

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::{Error, Result};
use crate::protocol::ClientEntry;

/// One configured client on an inbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Client UUID string
    pub id: String,
    /// Traffic profile name; empty or unknown disables morphing
    #[serde(default)]
    pub policy: String,
}

/// Fallback origin for non-Reflex traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// TCP port on 127.0.0.1
    pub dest: u32,
}

/// ECH settings for either side of a connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Outer SNI visible to observers
    #[serde(default)]
    pub public_name: String,
    /// Server: TLS certificate path
    #[serde(default)]
    pub cert_file: String,
    /// Server: TLS key path
    #[serde(default)]
    pub key_file: String,
    /// Client: expected inner server name
    #[serde(default)]
    pub server_name: String,
    /// Client: skip certificate verification (testing only)
    #[serde(default)]
    pub insecure: bool,
}

/// Inbound (server-side) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundConfig {
    pub clients: Vec<UserConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ech: Option<EchSettings>,
}

impl InboundConfig {
    /// Validate and convert into authentication entries.
    pub fn build_clients(&self) -> Result<Vec<ClientEntry>> {
        if self.clients.is_empty() {
            return Err(Error::config("inbound: at least one client is required"));
        }

        let mut entries = Vec::with_capacity(self.clients.len());
        for user in &self.clients {
            if user.id.is_empty() {
                return Err(Error::config("inbound client: missing id"));
            }
            // Surfaces malformed UUIDs at load time instead of at handshake
            Account::new(&user.id)?;
            entries.push(ClientEntry {
                id: user.id.clone(),
                policy: user.policy.clone(),
            });
        }
        Ok(entries)
    }

    /// Validate ECH settings if present and enabled.
    pub fn validate_ech(&self) -> Result<()> {
        if let Some(ech) = &self.ech {
            if ech.enabled && (ech.cert_file.is_empty() || ech.key_file.is_empty()) {
                return Err(Error::config(
                    "inbound ECH: certFile and keyFile are required",
                ));
            }
        }
        Ok(())
    }

    /// The configured fallback port, if any.
    pub fn fallback_port(&self) -> Option<u32> {
        self.fallback.as_ref().map(|f| f.dest)
    }
}

/// Outbound (client-side) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// Reflex server address
    pub address: String,
    /// Reflex server port
    pub port: u32,
    /// Client UUID string
    pub id: String,
    /// Traffic profile name; empty or unknown disables morphing
    #[serde(default)]
    pub policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ech: Option<EchSettings>,
}

impl OutboundConfig {
    /// Validate the required fields.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(Error::config("outbound: missing server address"));
        }
        if self.port == 0 || self.port > u16::MAX as u32 {
            return Err(Error::config("outbound: invalid server port"));
        }
        if self.id.is_empty() {
            return Err(Error::config("outbound: missing client id"));
        }
        Account::new(&self.id)?;
        Ok(())
    }
}
