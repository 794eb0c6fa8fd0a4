//! In-Memory-Transport
//!
//! Ersetzt die Peer-Connection-Primitive der Plattform fuer Tests und den
//! lokalen Loopback-Betrieb. Transports fuer `(a, b)` und `(b, a)` sind
//! miteinander verknuepft: Frames und Tracks der einen Seite kommen auf der
//! anderen an.
//!
//! Ueber `MemoryHandle` koennen Tests Transport-Events einspeisen und
//! beobachten, was eine Verbindung gesendet hat.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use haven_core::PeerId;
use haven_crypto::EncryptedEnvelope;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::PeerConfig;
use crate::error::{PeerError, PeerResult};
use crate::media::{MediaTrack, RemoteStream};
use crate::signaling::{SdpKind, SessionDescription};
use crate::transport::{Transport, TransportEvent, TransportFactory, TransportState};

// ---------------------------------------------------------------------------
// Netz
// ---------------------------------------------------------------------------

type Schluessel = (PeerId, PeerId);

#[derive(Default)]
struct NetzInner {
    /// Endpunkte indiziert nach (lokal, remote)
    endpunkte: DashMap<Schluessel, Arc<Endpunkt>>,
}

/// Gemeinsames In-Memory-Netz aller lokalen Knoten
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetzInner>,
}

impl MemoryNetwork {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Transport-Factory fuer einen lokalen Teilnehmer
    pub fn factory(&self, lokal: impl Into<PeerId>) -> MemoryTransportFactory {
        MemoryTransportFactory {
            netz: self.clone(),
            lokal: lokal.into(),
        }
    }

    /// Handle auf den zuletzt erstellten Transport fuer `(lokal, remote)`
    pub fn handle(&self, lokal: &PeerId, remote: &PeerId) -> Option<MemoryHandle> {
        self.inner
            .endpunkte
            .get(&(lokal.clone(), remote.clone()))
            .map(|e| MemoryHandle {
                endpunkt: Arc::clone(e.value()),
            })
    }

    /// Anzahl erstellter (aktueller) Endpunkte
    pub fn len(&self) -> usize {
        self.inner.endpunkte.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.endpunkte.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Endpunkt
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EndpunktZustand {
    offers: Vec<SessionDescription>,
    answers: Vec<SessionDescription>,
    remote_beschreibungen: Vec<SessionDescription>,
    gesendet: Vec<Vec<u8>>,
    tracks: Vec<MediaTrack>,
    video: Option<MediaTrack>,
    offer_ausstehend: bool,
    kanal_offen: bool,
    geschlossen: bool,
    sendefehler: bool,
}

struct Endpunkt {
    lokal: PeerId,
    remote: PeerId,
    events: mpsc::UnboundedSender<TransportEvent>,
    zustand: Mutex<EndpunktZustand>,
    netz: Weak<NetzInner>,
}

impl Endpunkt {
    fn melden(&self, ereignis: TransportEvent) {
        let _ = self.events.send(ereignis);
    }

    /// Der verknuepfte Endpunkt der Gegenseite
    fn partner(&self) -> Option<Arc<Endpunkt>> {
        let netz = self.netz.upgrade()?;
        let partner = netz
            .endpunkte
            .get(&(self.remote.clone(), self.lokal.clone()))
            .map(|e| Arc::clone(e.value()))?;
        if partner.zustand.lock().geschlossen {
            return None;
        }
        Some(partner)
    }

    /// Oeffnet Kanal und meldet Connected (einmalig)
    fn oeffnen(&self, zustand: &mut EndpunktZustand) {
        if zustand.kanal_offen {
            return;
        }
        zustand.kanal_offen = true;
        self.melden(TransportEvent::ChannelOpen);
        self.melden(TransportEvent::State(TransportState::Connected));
    }

    fn nicht_geschlossen(&self, zustand: &EndpunktZustand) -> PeerResult<()> {
        if zustand.geschlossen {
            return Err(PeerError::signaling(format!(
                "Transport {} -> {} ist geschlossen",
                self.lokal, self.remote
            )));
        }
        Ok(())
    }

    fn stream_weiterleiten(&self, tracks: Vec<MediaTrack>) {
        if let Some(partner) = self.partner() {
            let stream = RemoteStream::neu(format!("stream-{}", self.lokal), tracks);
            partner.melden(TransportEvent::RemoteStream(stream));
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Erstellt In-Memory-Transports fuer einen lokalen Teilnehmer
#[derive(Clone)]
pub struct MemoryTransportFactory {
    netz: MemoryNetwork,
    lokal: PeerId,
}

impl MemoryTransportFactory {
    pub fn lokale_peer_id(&self) -> &PeerId {
        &self.lokal
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn erstellen(
        &self,
        peer_id: &PeerId,
        config: &PeerConfig,
    ) -> PeerResult<(Arc<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let netz = &self.netz.inner;
        let (tx, rx) = mpsc::unbounded_channel();
        let endpunkt = Arc::new(Endpunkt {
            lokal: self.lokal.clone(),
            remote: peer_id.clone(),
            events: tx,
            zustand: Mutex::new(EndpunktZustand::default()),
            netz: Arc::downgrade(netz),
        });
        netz.endpunkte
            .insert((self.lokal.clone(), peer_id.clone()), Arc::clone(&endpunkt));

        tracing::debug!(
            lokal = %self.lokal,
            remote = %peer_id,
            kanal = %config.kanal_label,
            geordnet = config.geordnet,
            "In-Memory-Transport erstellt"
        );
        Ok((Arc::new(MemoryTransport { endpunkt }), rx))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// In-Memory-Implementierung von `Transport`
pub struct MemoryTransport {
    endpunkt: Arc<Endpunkt>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn create_offer(&self) -> PeerResult<SessionDescription> {
        let e = &self.endpunkt;
        let mut zustand = e.zustand.lock();
        e.nicht_geschlossen(&zustand)?;

        let offer = SessionDescription::offer(format!(
            "v=0 memory-offer {} -> {} #{}",
            e.lokal,
            e.remote,
            zustand.offers.len() + 1
        ));
        zustand.offers.push(offer.clone());
        zustand.offer_ausstehend = true;
        Ok(offer)
    }

    async fn create_answer(&self, offer: &SessionDescription) -> PeerResult<SessionDescription> {
        let e = &self.endpunkt;
        let mut zustand = e.zustand.lock();
        e.nicht_geschlossen(&zustand)?;
        if offer.kind != SdpKind::Offer {
            return Err(PeerError::signaling("Answer kann nur auf eine Offer erzeugt werden"));
        }

        let answer = SessionDescription::answer(format!(
            "v=0 memory-answer {} -> {} #{}",
            e.lokal,
            e.remote,
            zustand.answers.len() + 1
        ));
        zustand.answers.push(answer.clone());
        e.oeffnen(&mut zustand);
        Ok(answer)
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> PeerResult<()> {
        let e = &self.endpunkt;
        let mut zustand = e.zustand.lock();
        e.nicht_geschlossen(&zustand)?;
        description.validieren()?;

        match description.kind {
            SdpKind::Answer => {
                if !zustand.offer_ausstehend {
                    return Err(PeerError::signaling("Keine ausstehende Offer"));
                }
                zustand.offer_ausstehend = false;
                zustand.remote_beschreibungen.push(description.clone());
                e.oeffnen(&mut zustand);
            }
            SdpKind::Offer => {
                zustand.remote_beschreibungen.push(description.clone());
            }
        }
        Ok(())
    }

    fn send(&self, frame: &[u8]) -> PeerResult<()> {
        let e = &self.endpunkt;
        {
            let mut zustand = e.zustand.lock();
            if zustand.geschlossen || !zustand.kanal_offen {
                return Err(PeerError::TransportFailure("Datenkanal nicht offen".into()));
            }
            if zustand.sendefehler {
                return Err(PeerError::TransportFailure("Simulierter Sendefehler".into()));
            }
            zustand.gesendet.push(frame.to_vec());
        }

        if let Some(partner) = e.partner() {
            partner.melden(TransportEvent::Frame(frame.to_vec()));
        }
        Ok(())
    }

    fn add_track(&self, track: &MediaTrack) -> PeerResult<()> {
        let e = &self.endpunkt;
        let tracks = {
            let mut zustand = e.zustand.lock();
            if zustand.geschlossen {
                return Err(PeerError::TransportFailure("Transport geschlossen".into()));
            }
            zustand.tracks.push(track.clone());
            zustand.tracks.clone()
        };
        e.stream_weiterleiten(tracks);
        Ok(())
    }

    fn replace_video_track(&self, track: Option<&MediaTrack>) -> PeerResult<()> {
        let e = &self.endpunkt;
        let mut zustand = e.zustand.lock();
        if zustand.geschlossen {
            return Err(PeerError::TransportFailure("Transport geschlossen".into()));
        }
        zustand.video = track.cloned();
        Ok(())
    }

    fn close(&self) {
        let e = &self.endpunkt;
        {
            let mut zustand = e.zustand.lock();
            if zustand.geschlossen {
                return;
            }
            zustand.geschlossen = true;
            zustand.kanal_offen = false;
            zustand.offer_ausstehend = false;
        }

        if let Some(partner) = e.partner() {
            partner.zustand.lock().kanal_offen = false;
            partner.melden(TransportEvent::ChannelClosed);
            partner.melden(TransportEvent::State(TransportState::Disconnected));
        }
        tracing::debug!(lokal = %e.lokal, remote = %e.remote, "In-Memory-Transport geschlossen");
    }
}

// ---------------------------------------------------------------------------
// Test-Handle
// ---------------------------------------------------------------------------

/// Steuerung und Beobachtung eines In-Memory-Transports
#[derive(Clone)]
pub struct MemoryHandle {
    endpunkt: Arc<Endpunkt>,
}

impl MemoryHandle {
    /// Simuliert einen erfolgreichen Verbindungsaufbau
    pub fn connect(&self) {
        let mut zustand = self.endpunkt.zustand.lock();
        zustand.kanal_offen = false;
        self.endpunkt.oeffnen(&mut zustand);
    }

    /// Simuliert einen ICE-/Transportfehler
    pub fn fail(&self) {
        self.endpunkt.zustand.lock().kanal_offen = false;
        self.endpunkt.melden(TransportEvent::ChannelClosed);
        self.endpunkt
            .melden(TransportEvent::State(TransportState::Failed));
    }

    /// Simuliert eine Unterbrechung
    pub fn disconnect(&self) {
        self.endpunkt
            .melden(TransportEvent::State(TransportState::Disconnected));
    }

    /// Simuliert ein Schliessen durch die Plattform
    pub fn close_remote(&self) {
        self.endpunkt
            .melden(TransportEvent::State(TransportState::Closed));
    }

    /// Stellt einen Umschlag als eingehenden Frame zu
    pub fn deliver(&self, envelope: &EncryptedEnvelope) {
        match serde_json::to_vec(envelope) {
            Ok(frame) => self.deliver_raw(frame),
            Err(e) => tracing::error!(fehler = %e, "Umschlag nicht serialisierbar"),
        }
    }

    /// Stellt beliebige Bytes als eingehenden Frame zu
    pub fn deliver_raw(&self, frame: impl Into<Vec<u8>>) {
        self.endpunkt.melden(TransportEvent::Frame(frame.into()));
    }

    /// Haengt einen entfernten Stream an
    pub fn attach_remote_stream(&self, stream: RemoteStream) {
        self.endpunkt.melden(TransportEvent::RemoteStream(stream));
    }

    /// Laesst kuenftige `send`-Aufrufe fehlschlagen
    pub fn set_send_failure(&self, aktiv: bool) {
        self.endpunkt.zustand.lock().sendefehler = aktiv;
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.endpunkt.zustand.lock().gesendet.clone()
    }

    /// Gesendete Frames als Umschlaege (ungueltige werden uebersprungen)
    pub fn sent_envelopes(&self) -> Vec<EncryptedEnvelope> {
        self.sent_frames()
            .iter()
            .filter_map(|f| serde_json::from_slice(f).ok())
            .collect()
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.endpunkt.zustand.lock().tracks.clone()
    }

    /// Aktuell ersetzter Video-Track (Bildschirm oder Kamera)
    pub fn video_track(&self) -> Option<MediaTrack> {
        self.endpunkt.zustand.lock().video.clone()
    }

    pub fn offers(&self) -> Vec<SessionDescription> {
        self.endpunkt.zustand.lock().offers.clone()
    }

    pub fn answers(&self) -> Vec<SessionDescription> {
        self.endpunkt.zustand.lock().answers.clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.endpunkt.zustand.lock().remote_beschreibungen.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.endpunkt.zustand.lock().geschlossen
    }

    pub fn is_channel_open(&self) -> bool {
        self.endpunkt.zustand.lock().kanal_offen
    }
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("lokal", &self.endpunkt.lokal)
            .field("remote", &self.endpunkt.remote)
            .finish()
    }
}
