//! Konfiguration fuer Peer-Verbindungen
//!
//! Entspricht dem Abschnitt `[peer]` der Knoten-Konfiguration.

use serde::{Deserialize, Serialize};

use crate::error::{PeerError, PeerResult};

/// Erlaubte URL-Schemata fuer Relay-/Rendezvous-Endpunkte
const ERLAUBTE_SCHEMATA: [&str; 3] = ["stun:", "turn:", "turns:"];

/// Ein STUN/TURN-Endpunkt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl RelayEndpoint {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Konfiguration fuer Peer-Verbindungen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// STUN/TURN-Server fuer den Verbindungsaufbau
    pub relay_endpoints: Vec<RelayEndpoint>,
    /// Label des Datenkanals
    pub kanal_label: String,
    /// Geordnete Zustellung auf dem Datenkanal
    pub geordnet: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            relay_endpoints: vec![
                RelayEndpoint::stun("stun:stun.l.google.com:19302"),
                RelayEndpoint::stun("stun:stun1.l.google.com:19302"),
            ],
            kanal_label: "messages".to_string(),
            geordnet: true,
        }
    }
}

impl PeerConfig {
    /// Prueft Endpunkte und Kanal-Label
    pub fn validieren(&self) -> PeerResult<()> {
        if self.kanal_label.trim().is_empty() {
            return Err(PeerError::Configuration("kanal_label darf nicht leer sein".into()));
        }

        for (i, endpunkt) in self.relay_endpoints.iter().enumerate() {
            if endpunkt.urls.is_empty() {
                return Err(PeerError::Configuration(format!(
                    "relay_endpoints[{i}]: keine URLs angegeben"
                )));
            }
            for url in &endpunkt.urls {
                if !ERLAUBTE_SCHEMATA.iter().any(|s| url.starts_with(s)) {
                    return Err(PeerError::Configuration(format!(
                        "relay_endpoints[{i}]: ungueltiges Schema in '{url}'"
                    )));
                }
            }
        }
        Ok(())
    }
}
