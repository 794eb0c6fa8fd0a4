//! Zustandsautomat einer Peer-Verbindung
//!
//! ```text
//! New -> Connecting -> Connected <-> Disconnected
//!             |            |              |
//!             +-> Failed <-+--------------+
//!
//! jeder Zustand ausser Closed -> Closed
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PeerError, PeerResult};

/// Zustand einer Peer-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    /// Angelegt, noch kein Aufbau gestartet
    New,
    /// Offer/Answer laeuft
    Connecting,
    /// Transport steht, Kanal nutzbar
    Connected,
    /// Transport voruebergehend unterbrochen
    Disconnected,
    /// Transport endgueltig fehlgeschlagen
    Failed,
    /// Beendet, alle Ressourcen freigegeben
    Closed,
}

impl PeerConnectionState {
    /// Prueft ob der Wechsel laut Uebergangstabelle erlaubt ist
    pub fn darf_wechseln_zu(self, ziel: PeerConnectionState) -> bool {
        use PeerConnectionState::*;
        match (self, ziel) {
            (Closed, _) => false,
            (_, Closed) => true,
            (New, Connecting) => true,
            (Connecting, Connected | Failed) => true,
            (Connected, Disconnected | Failed) => true,
            (Disconnected, Connected | Failed) => true,
            _ => false,
        }
    }

    /// Wie `darf_wechseln_zu`, liefert aber einen Fehler
    pub fn wechsel_pruefen(self, ziel: PeerConnectionState) -> PeerResult<()> {
        if self.darf_wechseln_zu(ziel) {
            Ok(())
        } else {
            Err(PeerError::IllegalTransition {
                von: self,
                nach: ziel,
            })
        }
    }

    /// Failed und Closed sind fuer Medien-Operationen gesperrt
    pub fn ist_beendet(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    pub fn als_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}
