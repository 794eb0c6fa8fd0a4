//! PeerConnectionRegistry – eine Verbindung pro Peer
//!
//! Haelt hoechstens eine lebende (nicht geschlossene) Verbindung pro PeerId.
//! Das Anlegen laeuft unter dem Schreib-Lock des DashMap-Shards, so dass
//! zwei gleichzeitige Erstzugriffe nie zwei Verbindungen erzeugen.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use haven_core::PeerId;
use haven_crypto::EncryptedEnvelope;
use tokio::sync::broadcast;

use crate::config::PeerConfig;
use crate::connection::PeerConnection;
use crate::error::{PeerError, PeerResult};
use crate::events::{PeerEvent, EVENT_KANAL_GROESSE};
use crate::listener::Subscription;
use crate::media::{LocalStream, MediaSessionState, MediaTrack, RemoteStream};
use crate::message::ChannelMessage;
use crate::signaling::{SdpKind, SessionDescription, SignalingSink};
use crate::state::PeerConnectionState;
use crate::transport::TransportFactory;

struct RegistryInner {
    verbindungen: DashMap<PeerId, PeerConnection>,
    config: PeerConfig,
    transports: Arc<dyn TransportFactory>,
    signaling: Arc<dyn SignalingSink>,
    event_tx: broadcast::Sender<PeerEvent>,
}

/// Verwaltet alle Peer-Verbindungen eines Knotens
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct PeerConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl PeerConnectionRegistry {
    pub fn neu(
        config: PeerConfig,
        transports: Arc<dyn TransportFactory>,
        signaling: Arc<dyn SignalingSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(RegistryInner {
                verbindungen: DashMap::new(),
                config,
                transports,
                signaling,
                event_tx,
            }),
        }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    /// Abonniert Lebenszyklus-Events aller Verbindungen
    pub fn subscribe_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.event_tx.subscribe()
    }

    fn verbindung_erstellen(&self, peer_id: &PeerId) -> PeerResult<PeerConnection> {
        PeerConnection::neu(
            peer_id.clone(),
            &self.inner.config,
            self.inner.transports.as_ref(),
            Arc::clone(&self.inner.signaling),
            Some(self.inner.event_tx.clone()),
        )
    }

    /// Liefert die lebende Verbindung oder legt eine neue an
    ///
    /// Der zweite Wert ist `true` wenn die Verbindung neu ist.
    fn eintrag(&self, peer_id: &PeerId) -> PeerResult<(PeerConnection, bool)> {
        match self.inner.verbindungen.entry(peer_id.clone()) {
            Entry::Occupied(mut belegt) => {
                if belegt.get().state() != PeerConnectionState::Closed {
                    return Ok((belegt.get().clone(), false));
                }
                let neu = self.verbindung_erstellen(peer_id)?;
                belegt.insert(neu.clone());
                tracing::debug!(peer_id = %peer_id, "Geschlossene Verbindung ersetzt");
                Ok((neu, true))
            }
            Entry::Vacant(frei) => {
                let neu = self.verbindung_erstellen(peer_id)?;
                frei.insert(neu.clone());
                tracing::debug!(peer_id = %peer_id, "Verbindung registriert");
                Ok((neu, true))
            }
        }
    }

    /// Liefert die bestehende Verbindung oder legt eine an und startet den Aufbau
    ///
    /// Der Aufbau (`New -> Connecting`) passiert synchron, die Offer wird
    /// auf der tokio-Runtime erzeugt. Ergebnis ueber `connect` oder den Zustand;
    /// ein Signaling-Fehler der Offer wird von `connect` gemeldet.
    pub fn get_or_create(&self, peer_id: &PeerId) -> PeerResult<PeerConnection> {
        let (verbindung, neu) = self.eintrag(peer_id)?;
        if neu && verbindung.aufbau_beginnen()? {
            let v = verbindung.clone();
            tokio::spawn(async move {
                if let Err(e) = v.aufbau_angebot_senden().await {
                    tracing::warn!(peer_id = %v.peer_id(), fehler = %e, "Offer fehlgeschlagen");
                }
            });
        }
        Ok(verbindung)
    }

    /// Wie `get_or_create`, wartet aber bis die Verbindung steht
    pub async fn connect(&self, peer_id: &PeerId) -> PeerResult<PeerConnection> {
        let verbindung = self.get_or_create(peer_id)?;
        verbindung.connect().await?;
        Ok(verbindung)
    }

    /// Nimmt eine eingehende Offer an (Angerufener)
    ///
    /// Legt die Verbindung ohne eigene Offer an oder verwendet die bestehende.
    pub async fn accept_offer(
        &self,
        peer_id: &PeerId,
        offer: SessionDescription,
    ) -> PeerResult<PeerConnection> {
        if offer.kind != SdpKind::Offer {
            return Err(PeerError::signaling("accept_offer erwartet eine Offer"));
        }
        let (verbindung, _) = self.eintrag(peer_id)?;
        verbindung.apply_remote_description(offer).await?;
        Ok(verbindung)
    }

    /// Leitet eine entfernte Beschreibung an die Verbindung weiter
    pub async fn apply_remote_description(
        &self,
        peer_id: &PeerId,
        description: SessionDescription,
    ) -> PeerResult<()> {
        self.verbindung_pflicht(peer_id)?
            .apply_remote_description(description)
            .await
    }

    /// Lebende Verbindung (nicht `Closed`)
    pub fn get(&self, peer_id: &PeerId) -> Option<PeerConnection> {
        self.inner
            .verbindungen
            .get(peer_id)
            .map(|v| v.value().clone())
            .filter(|v| v.state() != PeerConnectionState::Closed)
    }

    fn verbindung_pflicht(&self, peer_id: &PeerId) -> PeerResult<PeerConnection> {
        self.get(peer_id)
            .ok_or_else(|| PeerError::PeerNotFound(peer_id.clone()))
    }

    /// Fassade fuer einen einzelnen Peer
    pub fn peer(&self, peer_id: impl Into<PeerId>) -> PeerHandle {
        PeerHandle {
            registry: self.clone(),
            peer_id: peer_id.into(),
        }
    }

    // -----------------------------------------------------------------------
    // Delegation pro Peer
    // -----------------------------------------------------------------------

    /// Sendet an einen Peer. Unbekannter Peer ist ein Fehler.
    pub fn send(&self, peer_id: &PeerId, envelope: &EncryptedEnvelope) -> PeerResult<bool> {
        Ok(self.verbindung_pflicht(peer_id)?.send(envelope))
    }

    /// Registriert einen Nachrichten-Listener
    ///
    /// Unbekannter Peer: Warnung und leeres `Subscription`.
    pub fn on_message<F>(&self, peer_id: &PeerId, listener: F) -> Subscription
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        match self.get(peer_id) {
            Some(v) => v.on_message(listener),
            None => {
                tracing::warn!(peer_id = %peer_id, "on_message fuer unbekannten Peer");
                Subscription::leer()
            }
        }
    }

    /// Registriert einen Remote-Stream-Listener
    pub fn on_remote_stream<F>(&self, peer_id: &PeerId, listener: F) -> Subscription
    where
        F: Fn(&RemoteStream) + Send + Sync + 'static,
    {
        match self.get(peer_id) {
            Some(v) => v.on_remote_stream(listener),
            None => {
                tracing::warn!(peer_id = %peer_id, "on_remote_stream fuer unbekannten Peer");
                Subscription::leer()
            }
        }
    }

    pub async fn start_call(&self, peer_id: &PeerId, stream: LocalStream) -> PeerResult<()> {
        self.verbindung_pflicht(peer_id)?.start_call(stream).await
    }

    /// Beendet den Anruf und entfernt die Verbindung
    pub fn end_call(&self, peer_id: &PeerId) {
        match self.inner.verbindungen.remove(peer_id) {
            Some((_, verbindung)) => verbindung.end_call(),
            None => tracing::debug!(peer_id = %peer_id, "end_call fuer unbekannten Peer"),
        }
    }

    pub fn toggle_video(&self, peer_id: &PeerId) -> Option<bool> {
        self.get(peer_id)?.toggle_video()
    }

    pub fn toggle_audio(&self, peer_id: &PeerId) -> Option<bool> {
        self.get(peer_id)?.toggle_audio()
    }

    pub fn start_screen_share(&self, peer_id: &PeerId, track: MediaTrack) -> PeerResult<()> {
        self.verbindung_pflicht(peer_id)?.start_screen_share(track)
    }

    pub fn stop_screen_share(&self, peer_id: &PeerId) -> PeerResult<()> {
        self.verbindung_pflicht(peer_id)?.stop_screen_share()
    }

    pub fn state(&self, peer_id: &PeerId) -> Option<PeerConnectionState> {
        self.get(peer_id).map(|v| v.state())
    }

    pub fn media_state(&self, peer_id: &PeerId) -> Option<MediaSessionState> {
        self.get(peer_id).map(|v| v.media_state())
    }

    // -----------------------------------------------------------------------
    // Verwaltung
    // -----------------------------------------------------------------------

    /// IDs aller registrierten Peers
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.inner
            .verbindungen
            .iter()
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.verbindungen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.verbindungen.is_empty()
    }

    /// Beendet alle Verbindungen
    pub fn close_all(&self) {
        let ids = self.peer_ids();
        tracing::info!(anzahl = ids.len(), "Alle Verbindungen werden beendet");
        for id in ids {
            self.end_call(&id);
        }
    }
}

// ---------------------------------------------------------------------------
// PeerHandle
// ---------------------------------------------------------------------------

/// Fassade fuer genau einen Peer
///
/// Jede Operation delegiert an die Registry, so dass ein Handle auch nach
/// `end_call` + erneutem Aufbau die aktuelle Verbindung trifft.
#[derive(Clone)]
pub struct PeerHandle {
    registry: PeerConnectionRegistry,
    peer_id: PeerId,
}

impl PeerHandle {
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub async fn connect(&self) -> PeerResult<()> {
        self.registry.connect(&self.peer_id).await.map(|_| ())
    }

    pub fn send(&self, envelope: &EncryptedEnvelope) -> PeerResult<bool> {
        self.registry.send(&self.peer_id, envelope)
    }

    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        self.registry.on_message(&self.peer_id, listener)
    }

    pub fn on_remote_stream<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RemoteStream) + Send + Sync + 'static,
    {
        self.registry.on_remote_stream(&self.peer_id, listener)
    }

    pub async fn start_call(&self, stream: LocalStream) -> PeerResult<()> {
        self.registry.start_call(&self.peer_id, stream).await
    }

    pub fn end_call(&self) {
        self.registry.end_call(&self.peer_id)
    }

    pub fn toggle_video(&self) -> Option<bool> {
        self.registry.toggle_video(&self.peer_id)
    }

    pub fn toggle_audio(&self) -> Option<bool> {
        self.registry.toggle_audio(&self.peer_id)
    }

    pub fn start_screen_share(&self, track: MediaTrack) -> PeerResult<()> {
        self.registry.start_screen_share(&self.peer_id, track)
    }

    pub fn stop_screen_share(&self) -> PeerResult<()> {
        self.registry.stop_screen_share(&self.peer_id)
    }

    pub fn state(&self) -> Option<PeerConnectionState> {
        self.registry.state(&self.peer_id)
    }

    pub fn media_state(&self) -> Option<MediaSessionState> {
        self.registry.media_state(&self.peer_id)
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("peer_id", &self.peer_id)
            .finish()
    }
}
