//! PeerConnection – Verbindung zu genau einem entfernten Teilnehmer
//!
//! Jede Verbindung besitzt einen Transport (Datenkanal + Medien), einen
//! expliziten Zustandsautomaten und einen eigenen tokio-Task, der die
//! Transport-Events der Reihe nach verarbeitet.
//!
//! ## Ablauf (Anrufer)
//! ```text
//! connect()  New -> Connecting, Offer -> SignalingSink
//! apply_remote_description(Answer)
//! Transport: ChannelOpen, State(Connected)  -> Connected
//! ```
//!
//! ## Ablauf (Angerufener)
//! ```text
//! apply_remote_description(Offer)  New -> Connecting, Answer -> SignalingSink
//! Transport: ChannelOpen, State(Connected)  -> Connected
//! ```
//!
//! Transportfehler fuehren zu `Failed` und werden nur ueber den Zustand
//! gemeldet. Es gibt keine automatischen Wiederholungen.

use std::sync::{Arc, Weak};

use haven_core::PeerId;
use haven_crypto::EncryptedEnvelope;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::PeerConfig;
use crate::error::{PeerError, PeerResult};
use crate::events::PeerEvent;
use crate::listener::{ListenerSet, Subscription};
use crate::media::{LocalStream, LocalTracksEnabled, MediaSessionState, MediaTrack, RemoteStream};
use crate::message::ChannelMessage;
use crate::signaling::{SdpKind, SessionDescription, SignalingSink};
use crate::state::PeerConnectionState;
use crate::transport::{Transport, TransportEvent, TransportFactory, TransportState};

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

/// Veraenderlicher Zustand, geschuetzt durch einen einzigen Lock
///
/// `send`, `start_call` und `end_call` laufen unter diesem Lock, damit ein
/// beendeter Anruf keinen Track mehr aktiv zuruecklaesst.
struct Verbindungsdaten {
    zustand: PeerConnectionState,
    kanal_offen: bool,
    offer_ausstehend: bool,
    lokal: Option<LocalStream>,
    remote: Option<RemoteStream>,
    bildschirm: Option<MediaTrack>,
}

struct Inner {
    peer_id: PeerId,
    transport: Arc<dyn Transport>,
    signaling: Arc<dyn SignalingSink>,
    daten: Mutex<Verbindungsdaten>,
    state_tx: watch::Sender<PeerConnectionState>,
    /// Letzter Fehler beim Senden der Aufbau-Offer
    aufbau_fehler: watch::Sender<Option<PeerError>>,
    events: Option<broadcast::Sender<PeerEvent>>,
    nachrichten: Arc<ListenerSet<ChannelMessage>>,
    streams: Arc<ListenerSet<RemoteStream>>,
    pumpe: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Fuehrt einen Zustandswechsel durch (Lock muss gehalten werden)
    fn wechseln(
        &self,
        daten: &mut Verbindungsdaten,
        ziel: PeerConnectionState,
    ) -> PeerResult<PeerConnectionState> {
        let von = daten.zustand;
        von.wechsel_pruefen(ziel)?;

        daten.zustand = ziel;
        self.state_tx.send_replace(ziel);
        tracing::debug!(peer_id = %self.peer_id, von = %von, nach = %ziel, "Zustandswechsel");

        if let Some(tx) = &self.events {
            let _ = tx.send(PeerEvent::StateChanged {
                peer_id: self.peer_id.clone(),
                from: von,
                to: ziel,
            });
        }
        Ok(von)
    }

    /// Zustandswechsel ausgeloest durch ein Transport-Event
    fn transport_wechsel(&self, ziel: PeerConnectionState) {
        let mut daten = self.daten.lock();
        if ziel == PeerConnectionState::Failed {
            daten.kanal_offen = false;
        }
        if let Err(e) = self.wechseln(&mut daten, ziel) {
            tracing::warn!(peer_id = %self.peer_id, fehler = %e, "Transport-Event ignoriert");
        }
    }

    /// Beendet die Verbindung und gibt alle Ressourcen frei
    ///
    /// Idempotent. Liefert `false` wenn die Verbindung bereits geschlossen war.
    fn beenden(&self) -> bool {
        let pumpe = {
            let mut daten = self.daten.lock();
            if daten.zustand == PeerConnectionState::Closed {
                return false;
            }

            if let Some(stream) = daten.lokal.take() {
                stream.alle_stoppen();
            }
            if let Some(track) = daten.bildschirm.take() {
                track.stop();
            }
            daten.remote = None;
            daten.kanal_offen = false;
            daten.offer_ausstehend = false;

            self.transport.close();
            if let Err(e) = self.wechseln(&mut daten, PeerConnectionState::Closed) {
                tracing::error!(peer_id = %self.peer_id, fehler = %e, "Schliessen fehlgeschlagen");
            }

            self.nachrichten.leeren();
            self.streams.leeren();

            if let Some(tx) = &self.events {
                let _ = tx.send(PeerEvent::Closed {
                    peer_id: self.peer_id.clone(),
                });
            }
            self.pumpe.lock().take()
        };

        if let Some(handle) = pumpe {
            handle.abort();
        }
        tracing::info!(peer_id = %self.peer_id, "Verbindung beendet");
        true
    }

    /// Verarbeitet ein einzelnes Transport-Event
    fn ereignis(&self, ereignis: TransportEvent) {
        match ereignis {
            TransportEvent::ChannelOpen => {
                let mut daten = self.daten.lock();
                if daten.zustand != PeerConnectionState::Closed {
                    daten.kanal_offen = true;
                    tracing::debug!(peer_id = %self.peer_id, "Datenkanal offen");
                }
            }
            TransportEvent::ChannelClosed => {
                self.daten.lock().kanal_offen = false;
                tracing::debug!(peer_id = %self.peer_id, "Datenkanal geschlossen");
            }
            TransportEvent::State(TransportState::Connected) => {
                self.transport_wechsel(PeerConnectionState::Connected);
            }
            TransportEvent::State(TransportState::Disconnected) => {
                self.transport_wechsel(PeerConnectionState::Disconnected);
            }
            TransportEvent::State(TransportState::Failed) => {
                tracing::warn!(peer_id = %self.peer_id, "Transport fehlgeschlagen");
                self.transport_wechsel(PeerConnectionState::Failed);
            }
            TransportEvent::State(TransportState::Closed) => {
                self.beenden();
            }
            TransportEvent::Frame(frame) => self.frame_zustellen(&frame),
            TransportEvent::RemoteStream(stream) => self.stream_anhaengen(stream),
        }
    }

    fn frame_zustellen(&self, frame: &[u8]) {
        if self.daten.lock().zustand == PeerConnectionState::Closed {
            return;
        }

        let payload: EncryptedEnvelope = match serde_json::from_slice(frame) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    peer_id = %self.peer_id,
                    bytes = frame.len(),
                    fehler = %e,
                    "Ungueltiger Frame verworfen"
                );
                return;
            }
        };

        let nachricht = ChannelMessage::eingehend(self.peer_id.clone(), payload);
        let listener = self.nachrichten.schnappschuss();
        tracing::trace!(
            peer_id = %self.peer_id,
            message_id = %nachricht.id,
            listener = listener.len(),
            "Nachricht zugestellt"
        );
        for l in listener {
            l(&nachricht);
        }
    }

    fn stream_anhaengen(&self, stream: RemoteStream) {
        // Schnappschuss unter demselben Lock wie in `on_remote_stream`
        let listener = {
            let mut daten = self.daten.lock();
            if daten.zustand == PeerConnectionState::Closed {
                return;
            }
            daten.remote = Some(stream.clone());
            self.streams.schnappschuss()
        };

        tracing::info!(peer_id = %self.peer_id, stream = %stream.id(), "Remote-Stream angehaengt");
        if let Some(tx) = &self.events {
            let _ = tx.send(PeerEvent::RemoteStreamAttached {
                peer_id: self.peer_id.clone(),
                stream_id: stream.id().to_string(),
            });
        }
        for l in listener {
            l(&stream);
        }
    }
}

/// Verarbeitet Transport-Events bis der Kanal endet oder die Verbindung verschwindet
async fn ereignis_schleife(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(ereignis) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.ereignis(ereignis);
        if inner.daten.lock().zustand == PeerConnectionState::Closed {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// PeerConnection
// ---------------------------------------------------------------------------

/// Verbindung zu einem entfernten Peer
///
/// Clone teilt den inneren Zustand. Muss innerhalb einer tokio-Runtime
/// erstellt werden.
#[derive(Clone)]
pub struct PeerConnection {
    inner: Arc<Inner>,
}

impl PeerConnection {
    /// Erstellt eine neue Verbindung im Zustand `New`
    pub fn neu(
        peer_id: PeerId,
        config: &PeerConfig,
        transports: &dyn TransportFactory,
        signaling: Arc<dyn SignalingSink>,
        events: Option<broadcast::Sender<PeerEvent>>,
    ) -> PeerResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PeerError::NoRuntime)?;
        let (transport, event_rx) = transports.erstellen(&peer_id, config)?;
        let (state_tx, _) = watch::channel(PeerConnectionState::New);
        let (aufbau_fehler, _) = watch::channel(None);

        let inner = Arc::new(Inner {
            peer_id,
            transport,
            signaling,
            daten: Mutex::new(Verbindungsdaten {
                zustand: PeerConnectionState::New,
                kanal_offen: false,
                offer_ausstehend: false,
                lokal: None,
                remote: None,
                bildschirm: None,
            }),
            state_tx,
            aufbau_fehler,
            events,
            nachrichten: ListenerSet::neu(),
            streams: ListenerSet::neu(),
            pumpe: Mutex::new(None),
        });

        let handle = runtime.spawn(ereignis_schleife(Arc::downgrade(&inner), event_rx));
        *inner.pumpe.lock() = Some(handle);

        tracing::debug!(peer_id = %inner.peer_id, "Verbindung angelegt");
        Ok(Self { inner })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.inner.peer_id
    }

    /// Aktueller Zustand
    pub fn state(&self) -> PeerConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Beobachter fuer Zustandswechsel
    pub fn subscribe_state(&self) -> watch::Receiver<PeerConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Prueft ob beide Handles dieselbe Verbindung meinen
    pub fn ptr_eq(&self, other: &PeerConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau
    // -----------------------------------------------------------------------

    /// Baut die Verbindung auf und wartet bis sie steht
    ///
    /// Aus `New` wird der Aufbau gestartet, in `Connecting`/`Disconnected`
    /// wird auf das Ergebnis gewartet. Ist die Aufbau-Offer zuvor
    /// gescheitert, wird sie erneut gesendet. Kein eingebautes Timeout.
    pub async fn connect(&self) -> PeerResult<()> {
        if self.aufbau_beginnen()? || self.aufbau_gescheitert() {
            self.aufbau_angebot_senden().await?;
        }
        self.verbunden_abwarten().await
    }

    fn aufbau_gescheitert(&self) -> bool {
        self.state() == PeerConnectionState::Connecting
            && self.inner.aufbau_fehler.borrow().is_some()
    }

    /// Sendet die Aufbau-Offer und merkt sich einen Fehler fuer wartende `connect`-Aufrufe
    pub(crate) async fn aufbau_angebot_senden(&self) -> PeerResult<()> {
        self.inner.aufbau_fehler.send_replace(None);
        let ergebnis = self.angebot_senden().await;
        if let Err(e) = &ergebnis {
            self.inner.aufbau_fehler.send_replace(Some(e.clone()));
        }
        ergebnis
    }

    /// Synchroner Teil von `connect`: `New -> Connecting`
    ///
    /// Liefert `true` wenn dieser Aufruf den Aufbau gestartet hat.
    pub fn aufbau_beginnen(&self) -> PeerResult<bool> {
        let mut daten = self.inner.daten.lock();
        match daten.zustand {
            PeerConnectionState::New => {
                self.inner.wechseln(&mut daten, PeerConnectionState::Connecting)?;
                Ok(true)
            }
            PeerConnectionState::Closed => Err(PeerError::Closed),
            PeerConnectionState::Failed => Err(PeerError::TransportFailure(
                "Verbindung ist fehlgeschlagen".into(),
            )),
            _ => Ok(false),
        }
    }

    /// Erzeugt eine Offer und gibt sie an den Signaling-Sink
    pub async fn angebot_senden(&self) -> PeerResult<()> {
        let offer = self
            .inner
            .transport
            .create_offer()
            .await
            .map_err(PeerError::als_signaling)?;

        {
            let mut daten = self.inner.daten.lock();
            if daten.zustand == PeerConnectionState::Closed {
                return Err(PeerError::Closed);
            }
            daten.offer_ausstehend = true;
        }

        self.inner.signaling.local_description(&self.inner.peer_id, offer)
    }

    async fn verbunden_abwarten(&self) -> PeerResult<()> {
        let mut rx = self.inner.state_tx.subscribe();
        let mut fehler_rx = self.inner.aufbau_fehler.subscribe();
        loop {
            let zustand = *rx.borrow_and_update();
            let fehler = fehler_rx.borrow_and_update().clone();
            match zustand {
                PeerConnectionState::Connected => return Ok(()),
                PeerConnectionState::Failed => {
                    return Err(PeerError::TransportFailure(format!(
                        "Aufbau zu {} fehlgeschlagen",
                        self.inner.peer_id
                    )))
                }
                PeerConnectionState::Closed => return Err(PeerError::Closed),
                _ => {}
            }
            if let Some(e) = fehler {
                return Err(e);
            }

            let geaendert = tokio::select! {
                r = rx.changed() => r,
                r = fehler_rx.changed() => r,
            };
            if geaendert.is_err() {
                return Err(PeerError::Closed);
            }
        }
    }

    /// Uebernimmt eine entfernte Session-Beschreibung
    ///
    /// - `Answer`: beantwortet die ausstehende eigene Offer
    /// - `Offer`: Gegenseite ruft an; Answer wird erzeugt und gemeldet
    ///
    /// Fehler sind `PeerError::Signaling` und aendern den Zustand nicht.
    pub async fn apply_remote_description(&self, description: SessionDescription) -> PeerResult<()> {
        description.validieren()?;
        let zustand = self.state();
        if zustand == PeerConnectionState::Closed {
            return Err(PeerError::InvalidOperation {
                operation: "apply_remote_description",
                zustand,
            });
        }

        match description.kind {
            SdpKind::Answer => {
                if !self.inner.daten.lock().offer_ausstehend {
                    return Err(PeerError::signaling("Answer ohne ausstehende Offer"));
                }
                self.inner
                    .transport
                    .set_remote_description(&description)
                    .await
                    .map_err(PeerError::als_signaling)?;
                self.inner.daten.lock().offer_ausstehend = false;
                tracing::debug!(peer_id = %self.inner.peer_id, "Answer uebernommen");
                Ok(())
            }
            SdpKind::Offer => {
                self.inner
                    .transport
                    .set_remote_description(&description)
                    .await
                    .map_err(PeerError::als_signaling)?;

                {
                    let mut daten = self.inner.daten.lock();
                    if daten.zustand == PeerConnectionState::New {
                        self.inner.wechseln(&mut daten, PeerConnectionState::Connecting)?;
                    }
                }

                let answer = self
                    .inner
                    .transport
                    .create_answer(&description)
                    .await
                    .map_err(PeerError::als_signaling)?;
                tracing::debug!(peer_id = %self.inner.peer_id, "Offer beantwortet");
                self.inner.signaling.local_description(&self.inner.peer_id, answer)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Datenkanal
    // -----------------------------------------------------------------------

    /// Sendet einen Umschlag auf dem Datenkanal
    ///
    /// Liefert `false` wenn die Verbindung nicht `Connected` oder der Kanal
    /// nicht offen ist. Es wird nichts gepuffert.
    pub fn send(&self, envelope: &EncryptedEnvelope) -> bool {
        let daten = self.inner.daten.lock();
        if daten.zustand != PeerConnectionState::Connected || !daten.kanal_offen {
            tracing::debug!(
                peer_id = %self.inner.peer_id,
                zustand = %daten.zustand,
                kanal_offen = daten.kanal_offen,
                "Kanal nicht bereit"
            );
            return false;
        }

        let frame = match serde_json::to_vec(envelope) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(peer_id = %self.inner.peer_id, fehler = %e, "Umschlag nicht serialisierbar");
                return false;
            }
        };

        match self.inner.transport.send(&frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer_id = %self.inner.peer_id, fehler = %e, "Senden fehlgeschlagen");
                false
            }
        }
    }

    /// Registriert einen Listener fuer eingehende Nachrichten
    ///
    /// Alle Listener bekommen jede Nachricht in Ankunftsreihenfolge.
    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        self.inner.nachrichten.hinzufuegen(Arc::new(listener))
    }

    // -----------------------------------------------------------------------
    // Medien
    // -----------------------------------------------------------------------

    /// Haengt lokale Tracks an und verhandelt bei bestehender Verbindung neu
    ///
    /// Ein vorheriger lokaler Stream wird ersetzt und gestoppt. Schlaegt das
    /// Anhaengen fehl, werden die Tracks des neuen Streams gestoppt und der
    /// vorherige bleibt aktiv.
    pub async fn start_call(&self, stream: LocalStream) -> PeerResult<()> {
        let neu_verhandeln = {
            let mut daten = self.inner.daten.lock();
            if daten.zustand.ist_beendet() {
                return Err(PeerError::InvalidOperation {
                    operation: "start_call",
                    zustand: daten.zustand,
                });
            }

            if let Err(e) = self.tracks_anhaengen(&stream, daten.bildschirm.as_ref()) {
                // Bereits angehaengte Tracks duerfen nicht weiterlaufen
                stream.alle_stoppen();
                tracing::warn!(peer_id = %self.inner.peer_id, fehler = %e, "Anruf nicht gestartet");
                return Err(e);
            }
            if let Some(alt) = daten.lokal.replace(stream) {
                alt.alle_stoppen();
            }
            daten.zustand == PeerConnectionState::Connected
        };

        tracing::info!(peer_id = %self.inner.peer_id, neu_verhandeln, "Anruf gestartet");
        if neu_verhandeln {
            self.angebot_senden().await?;
        }
        Ok(())
    }

    /// Haengt alle Tracks an; eine laufende Bildschirmfreigabe bleibt das Video
    fn tracks_anhaengen(
        &self,
        stream: &LocalStream,
        bildschirm: Option<&MediaTrack>,
    ) -> PeerResult<()> {
        for track in stream.tracks() {
            self.inner.transport.add_track(track)?;
        }
        if let Some(bildschirm) = bildschirm {
            self.inner.transport.replace_video_track(Some(bildschirm))?;
        }
        Ok(())
    }

    /// Registriert einen Listener fuer entfernte Streams
    ///
    /// Ist bereits ein Stream angehaengt, wird der Listener sofort damit
    /// aufgerufen.
    pub fn on_remote_stream<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RemoteStream) + Send + Sync + 'static,
    {
        let listener: Arc<dyn Fn(&RemoteStream) + Send + Sync> = Arc::new(listener);
        let (subscription, aktuell) = {
            let daten = self.inner.daten.lock();
            let sub = self.inner.streams.hinzufuegen(Arc::clone(&listener));
            (sub, daten.remote.clone())
        };
        if let Some(stream) = aktuell {
            listener(&stream);
        }
        subscription
    }

    /// Beendet Anruf und Verbindung (idempotent)
    ///
    /// Stoppt alle lokalen Tracks, schliesst den Transport und wechselt nach
    /// `Closed`.
    pub fn end_call(&self) {
        self.inner.beenden();
    }

    /// Schaltet den ersten lokalen Video-Track um
    ///
    /// Liefert den neuen Zustand oder `None` ohne Video-Track.
    pub fn toggle_video(&self) -> Option<bool> {
        let daten = self.inner.daten.lock();
        daten
            .lokal
            .as_ref()
            .and_then(LocalStream::video_track)
            .map(MediaTrack::umschalten)
    }

    /// Schaltet den ersten lokalen Audio-Track um
    pub fn toggle_audio(&self) -> Option<bool> {
        let daten = self.inner.daten.lock();
        daten
            .lokal
            .as_ref()
            .and_then(LocalStream::audio_track)
            .map(MediaTrack::umschalten)
    }

    /// Ersetzt den ausgehenden Video-Track durch eine Bildschirmfreigabe
    pub fn start_screen_share(&self, track: MediaTrack) -> PeerResult<()> {
        let mut daten = self.inner.daten.lock();
        if daten.zustand.ist_beendet() {
            return Err(PeerError::InvalidOperation {
                operation: "start_screen_share",
                zustand: daten.zustand,
            });
        }

        self.inner.transport.replace_video_track(Some(&track))?;
        if let Some(alt) = daten.bildschirm.replace(track) {
            alt.stop();
        }
        tracing::info!(peer_id = %self.inner.peer_id, "Bildschirmfreigabe gestartet");
        Ok(())
    }

    /// Beendet die Bildschirmfreigabe und stellt den Kamera-Track wieder her
    pub fn stop_screen_share(&self) -> PeerResult<()> {
        let mut daten = self.inner.daten.lock();
        if daten.zustand.ist_beendet() {
            return Err(PeerError::InvalidOperation {
                operation: "stop_screen_share",
                zustand: daten.zustand,
            });
        }

        let Some(bildschirm) = daten.bildschirm.take() else {
            return Ok(());
        };
        bildschirm.stop();

        let kamera = daten.lokal.as_ref().and_then(LocalStream::video_track);
        self.inner.transport.replace_video_track(kamera)?;
        tracing::info!(peer_id = %self.inner.peer_id, "Bildschirmfreigabe beendet");
        Ok(())
    }

    /// Momentaufnahme des Medienzustands
    pub fn media_state(&self) -> MediaSessionState {
        let daten = self.inner.daten.lock();
        let lokal = daten.lokal.as_ref();
        MediaSessionState {
            local_tracks_enabled: LocalTracksEnabled {
                video: lokal
                    .and_then(LocalStream::video_track)
                    .is_some_and(MediaTrack::is_enabled),
                audio: lokal
                    .and_then(LocalStream::audio_track)
                    .is_some_and(MediaTrack::is_enabled),
            },
            remote_stream_attached: daten.remote.is_some(),
            screen_share_active: daten.bildschirm.is_some(),
        }
    }

    /// Anzahl registrierter Nachrichten-Listener
    #[cfg(test)]
    pub(crate) fn listener_anzahl(&self) -> usize {
        self.inner.nachrichten.len()
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer_id", &self.inner.peer_id)
            .field("state", &self.state())
            .finish()
    }
}
