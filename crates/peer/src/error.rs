//! Fehlertypen fuer Peer-Verbindungen

use haven_core::PeerId;
use thiserror::Error;

use crate::state::PeerConnectionState;

/// Fehlertyp fuer Peer-Verbindungen und die Registry
#[derive(Debug, Clone, Error)]
pub enum PeerError {
    /// Ungueltige oder abgelehnte Session-Beschreibung (Offer/Answer)
    #[error("Signaling-Fehler: {0}")]
    Signaling(String),

    /// Transport konnte nicht aufgebaut werden (Zustand Failed)
    #[error("Transport fehlgeschlagen: {0}")]
    TransportFailure(String),

    /// Zustandswechsel ist laut Uebergangstabelle nicht erlaubt
    #[error("Unzulaessiger Zustandswechsel: {von} -> {nach}")]
    IllegalTransition {
        von: PeerConnectionState,
        nach: PeerConnectionState,
    },

    /// Operation ist im aktuellen Zustand nicht erlaubt
    #[error("{operation} im Zustand {zustand} nicht erlaubt")]
    InvalidOperation {
        operation: &'static str,
        zustand: PeerConnectionState,
    },

    /// Keine Verbindung fuer diesen Peer registriert
    #[error("Peer nicht gefunden: {0}")]
    PeerNotFound(PeerId),

    /// Verbindung wurde geschlossen
    #[error("Verbindung geschlossen")]
    Closed,

    /// Ungueltige Peer-Konfiguration
    #[error("Konfigurationsfehler: {0}")]
    Configuration(String),

    /// Kein tokio-Runtime-Kontext verfuegbar
    #[error("Keine tokio-Runtime verfuegbar")]
    NoRuntime,
}

impl PeerError {
    /// Erstellt einen Signaling-Fehler
    pub fn signaling(msg: impl Into<String>) -> Self {
        Self::Signaling(msg.into())
    }

    /// Stuft einen beliebigen Fehler als Signaling-Fehler ein
    pub(crate) fn als_signaling(self) -> Self {
        match self {
            Self::Signaling(_) => self,
            andere => Self::Signaling(andere.to_string()),
        }
    }
}

/// Result-Typ fuer Peer-Verbindungen
pub type PeerResult<T> = Result<T, PeerError>;
