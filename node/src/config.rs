//! Knoten-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Knoten ohne Konfigurationsdatei
//! lauffaehig ist.

use haven_core::PeerId;
use haven_crypto::CipherAlgorithm;
use haven_messaging::STANDARD_MAX_LAENGE;
use haven_observability::{log_filter_gueltig, log_format_gueltig};
use haven_peer::PeerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// Standardpfad der Konfigurationsdatei
pub const STANDARD_PFAD: &str = "haven.toml";

/// Umgebungsvariable fuer den Konfigurationspfad
pub const ENV_CONFIG: &str = "HAVEN_CONFIG";

/// Vollstaendige Knoten-Konfiguration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HavenConfig {
    pub logging: LoggingEinstellungen,
    pub krypto: KryptoEinstellungen,
    /// Relay-Endpunkte und Datenkanal
    pub peer: PeerConfig,
    pub nachrichten: NachrichtenEinstellungen,
    pub knoten: KnotenEinstellungen,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Kryptografie-Einstellungen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KryptoEinstellungen {
    pub algorithmus: CipherAlgorithm,
}

/// Einstellungen der Nachrichten-Sitzung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NachrichtenEinstellungen {
    /// Maximale Laenge einer Text-Nachricht in Zeichen
    pub max_laenge: usize,
    /// Zusaetzliche Schluesselwoerter fuer den Hinweis auf sensible Inhalte
    pub zusaetzliche_schluesselwoerter: Vec<String>,
}

impl Default for NachrichtenEinstellungen {
    fn default() -> Self {
        Self {
            max_laenge: STANDARD_MAX_LAENGE,
            zusaetzliche_schluesselwoerter: Vec::new(),
        }
    }
}

/// Knoten-Identitaet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnotenEinstellungen {
    /// Eigene Peer-ID (leer = beim Start generiert)
    pub lokale_peer_id: Option<String>,
}

impl HavenConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Pfad aus `HAVEN_CONFIG`, sonst `haven.toml`
    pub fn pfad_aus_env() -> String {
        std::env::var(ENV_CONFIG).unwrap_or_else(|_| STANDARD_PFAD.into())
    }

    /// Prueft alle Abschnitte vor dem Start
    pub fn validieren(&self) -> NodeResult<()> {
        if !log_filter_gueltig(&self.logging.level) {
            return Err(NodeError::Config(format!(
                "logging.level: ungueltiger Filter '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(NodeError::Config(format!(
                "logging.format: '{}' (erlaubt: text, json)",
                self.logging.format
            )));
        }
        if self.nachrichten.max_laenge == 0 {
            return Err(NodeError::Config(
                "nachrichten.max_laenge muss groesser als 0 sein".into(),
            ));
        }
        if let Some(id) = &self.knoten.lokale_peer_id {
            if id.trim().is_empty() {
                return Err(NodeError::Config(
                    "knoten.lokale_peer_id darf nicht leer sein".into(),
                ));
            }
        }
        self.peer.validieren()?;
        Ok(())
    }

    /// Konfigurierte Peer-ID oder eine neu generierte
    pub fn peer_id_aufloesen(&self) -> PeerId {
        self.knoten
            .lokale_peer_id
            .as_deref()
            .map(PeerId::from)
            .unwrap_or_else(PeerId::generieren)
    }
}
