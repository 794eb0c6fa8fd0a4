//! Signaling-Schnittstelle
//!
//! Das Signaling-Protokoll selbst (WebSocket, HTTP, ...) liegt ausserhalb
//! dieses Crates. Eine Verbindung meldet jede lokal erzeugte
//! Session-Beschreibung an einen `SignalingSink` und nimmt entfernte
//! Beschreibungen ueber `apply_remote_description` entgegen.

use haven_core::PeerId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{PeerError, PeerResult};

/// Art einer Session-Beschreibung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session-Beschreibung (Offer oder Answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Strukturelle Pruefung (nicht leer)
    pub fn validieren(&self) -> PeerResult<()> {
        if self.sdp.trim().is_empty() {
            return Err(PeerError::signaling(format!("Leere SDP ({:?})", self.kind)));
        }
        Ok(())
    }
}

/// Ausgehende Signaling-Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingMessage {
    /// Ziel-Peer der Beschreibung
    pub peer_id: PeerId,
    pub description: SessionDescription,
}

/// Empfaenger lokal erzeugter Session-Beschreibungen
pub trait SignalingSink: Send + Sync {
    /// Wird fuer jede erzeugte Offer/Answer aufgerufen
    fn local_description(&self, peer_id: &PeerId, description: SessionDescription) -> PeerResult<()>;
}

/// Leitet Beschreibungen in einen tokio-mpsc-Kanal weiter
#[derive(Debug, Clone)]
pub struct ChannelSignaling {
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

impl ChannelSignaling {
    /// Erstellt Sink und zugehoerigen Empfaenger
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<SignalingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SignalingSink for ChannelSignaling {
    fn local_description(&self, peer_id: &PeerId, description: SessionDescription) -> PeerResult<()> {
        tracing::debug!(peer_id = %peer_id, kind = ?description.kind, "Lokale Beschreibung erzeugt");
        self.tx
            .send(SignalingMessage {
                peer_id: peer_id.clone(),
                description,
            })
            .map_err(|_| PeerError::signaling("Signaling-Kanal geschlossen"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leere_sdp_ist_ungueltig() {
        assert!(SessionDescription::offer("  ").validieren().is_err());
        assert!(SessionDescription::answer("v=0").validieren().is_ok());
    }

    #[tokio::test]
    async fn channel_signaling_leitet_weiter() {
        let (sink, mut rx) = ChannelSignaling::neu();
        let peer = PeerId::from("p1");
        sink.local_description(&peer, SessionDescription::offer("v=0"))
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.peer_id, peer);
        assert_eq!(msg.description.kind, SdpKind::Offer);
    }

    #[test]
    fn geschlossener_kanal_ist_signaling_fehler() {
        let (sink, rx) = ChannelSignaling::neu();
        drop(rx);
        let result = sink.local_description(&PeerId::from("p1"), SessionDescription::offer("v=0"));
        assert!(matches!(result, Err(PeerError::Signaling(_))));
    }
}
