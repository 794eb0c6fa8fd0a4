//! Transport-Schnittstelle
//!
//! Abstrahiert die Peer-Connection-Primitive der Plattform (ICE/DTLS,
//! Datenkanal, Medien). Ereignisse des Transports kommen geordnet ueber
//! einen mpsc-Kanal und werden pro Verbindung sequentiell verarbeitet.

use std::sync::Arc;

use async_trait::async_trait;
use haven_core::PeerId;
use tokio::sync::mpsc;

use crate::config::PeerConfig;
use crate::error::PeerResult;
use crate::media::{MediaTrack, RemoteStream};
use crate::signaling::SessionDescription;

/// Verbindungszustand wie ihn der Transport meldet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Ereignis des Transports
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Datenkanal ist offen
    ChannelOpen,
    /// Datenkanal wurde geschlossen
    ChannelClosed,
    /// Aenderung des Transportzustands
    State(TransportState),
    /// Eingehender Frame auf dem Datenkanal
    Frame(Vec<u8>),
    /// Entfernter Stream angehaengt oder geaendert
    RemoteStream(RemoteStream),
}

/// Peer-Connection-Primitive
///
/// `send`, `add_track`, `replace_video_track` und `close` sind synchron,
/// damit die Verbindung sie unter ihrem Zustands-Lock aufrufen kann.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Erzeugt eine Offer fuer die Gegenseite
    async fn create_offer(&self) -> PeerResult<SessionDescription>;

    /// Beantwortet eine zuvor gesetzte entfernte Offer
    async fn create_answer(&self, offer: &SessionDescription) -> PeerResult<SessionDescription>;

    /// Uebernimmt eine entfernte Beschreibung (Offer oder Answer)
    async fn set_remote_description(&self, description: &SessionDescription) -> PeerResult<()>;

    /// Sendet einen Frame auf dem zuverlaessigen, geordneten Datenkanal
    fn send(&self, frame: &[u8]) -> PeerResult<()>;

    fn add_track(&self, track: &MediaTrack) -> PeerResult<()>;

    /// Ersetzt den ausgehenden Video-Track (`None` = kein Video)
    fn replace_video_track(&self, track: Option<&MediaTrack>) -> PeerResult<()>;

    fn close(&self);
}

/// Erstellt einen Transport pro Verbindung
pub trait TransportFactory: Send + Sync {
    fn erstellen(
        &self,
        peer_id: &PeerId,
        config: &PeerConfig,
    ) -> PeerResult<(Arc<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>)>;
}
