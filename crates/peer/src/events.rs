//! Events die Verbindungen ueber die Registry versenden

use haven_core::PeerId;

use crate::state::PeerConnectionState;

/// Groesse des Broadcast-Kanals fuer Peer-Events
pub const EVENT_KANAL_GROESSE: usize = 256;

/// Lebenszyklus-Events einer Peer-Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Zustandswechsel laut Uebergangstabelle
    StateChanged {
        peer_id: PeerId,
        from: PeerConnectionState,
        to: PeerConnectionState,
    },
    /// Entfernter Stream angehaengt
    RemoteStreamAttached { peer_id: PeerId, stream_id: String },
    /// Verbindung beendet, Ressourcen freigegeben
    Closed { peer_id: PeerId },
}

impl PeerEvent {
    pub fn peer_id(&self) -> &PeerId {
        match self {
            Self::StateChanged { peer_id, .. }
            | Self::RemoteStreamAttached { peer_id, .. }
            | Self::Closed { peer_id } => peer_id,
        }
    }
}
