//! haven-node – Bibliotheks-Root
//!
//! Stellt das Kontextobjekt `HavenNode` bereit, das Cipher, Registry und
//! Nachrichten-Sitzung einmalig aus der Konfiguration aufbaut. Es gibt keine
//! globalen Instanzen; jeder Knoten haelt seine eigenen Komponenten.

pub mod config;
pub mod error;

use std::sync::Arc;

use haven_core::PeerId;
use haven_crypto::KeyedCipher;
use haven_messaging::{SecureMessagingSession, SensitiveContentDetector};
use haven_peer::{
    ChannelSignaling, MemoryNetwork, PeerConnectionRegistry, SdpKind, SignalingMessage,
    SignalingSink, TransportFactory,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use config::HavenConfig;
pub use error::{NodeError, NodeResult};

/// Ein lokaler Teilnehmer mit eigener Registry und Sitzung
pub struct HavenNode {
    config: HavenConfig,
    peer_id: PeerId,
    cipher: Arc<KeyedCipher>,
    registry: PeerConnectionRegistry,
    session: SecureMessagingSession,
}

impl HavenNode {
    /// Erzeugt und initialisiert einen Cipher nach `[krypto]`
    ///
    /// Der Schluessel ist fluechtig. Knoten, die miteinander sprechen sollen,
    /// muessen denselben Cipher erhalten; ein Schluesselaustausch findet nicht statt.
    pub fn cipher_erzeugen(config: &HavenConfig) -> NodeResult<Arc<KeyedCipher>> {
        let cipher = KeyedCipher::new(config.krypto.algorithmus);
        cipher.initialize()?;
        Ok(Arc::new(cipher))
    }

    /// Baut einen Knoten aus Konfiguration, Cipher und Transport-Seams
    pub fn neu(
        config: HavenConfig,
        cipher: Arc<KeyedCipher>,
        transports: Arc<dyn TransportFactory>,
        signaling: Arc<dyn SignalingSink>,
    ) -> NodeResult<Self> {
        config.validieren()?;

        if cipher.algorithm() != config.krypto.algorithmus {
            return Err(NodeError::Config(format!(
                "Cipher nutzt {}, konfiguriert ist {}",
                cipher.algorithm(),
                config.krypto.algorithmus
            )));
        }
        if !cipher.is_initialized() {
            cipher.initialize()?;
        }

        let peer_id = config.peer_id_aufloesen();
        let detector = SensitiveContentDetector::mit_schluesselwoertern(
            config.nachrichten.zusaetzliche_schluesselwoerter.as_slice(),
        )?;
        let registry = PeerConnectionRegistry::neu(config.peer.clone(), transports, signaling);
        let session = SecureMessagingSession::neu(Arc::clone(&cipher), registry.clone(), detector)
            .mit_max_laenge(config.nachrichten.max_laenge);

        tracing::info!(
            peer_id = %peer_id,
            algorithmus = %cipher.algorithm(),
            relay_endpunkte = config.peer.relay_endpoints.len(),
            "Knoten initialisiert"
        );

        Ok(Self {
            config,
            peer_id,
            cipher,
            registry,
            session,
        })
    }

    /// Knoten auf dem In-Memory-Transport mit Kanal-Signaling
    pub fn lokal(
        mut config: HavenConfig,
        netz: &MemoryNetwork,
        cipher: Arc<KeyedCipher>,
    ) -> NodeResult<(Self, mpsc::UnboundedReceiver<SignalingMessage>)> {
        // Peer-ID vorab festlegen, die Factory braucht sie
        let peer_id = config.peer_id_aufloesen();
        config.knoten.lokale_peer_id = Some(peer_id.as_str().to_string());

        let (sink, rx) = ChannelSignaling::neu();
        let knoten = Self::neu(
            config,
            cipher,
            Arc::new(netz.factory(peer_id)),
            Arc::new(sink),
        )?;
        Ok((knoten, rx))
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn config(&self) -> &HavenConfig {
        &self.config
    }

    pub fn cipher(&self) -> &Arc<KeyedCipher> {
        &self.cipher
    }

    pub fn registry(&self) -> &PeerConnectionRegistry {
        &self.registry
    }

    pub fn session(&self) -> &SecureMessagingSession {
        &self.session
    }

    /// Beendet alle Verbindungen des Knotens
    pub fn herunterfahren(&self) {
        tracing::info!(
            peer_id = %self.peer_id,
            verbindungen = self.registry.len(),
            "Knoten wird heruntergefahren"
        );
        self.registry.close_all();
    }
}

// ---------------------------------------------------------------------------
// Signaling zwischen lokalen Knoten
// ---------------------------------------------------------------------------

/// Leitet Offers und Answers zwischen zwei lokalen Knoten weiter
///
/// Offers gehen an `accept_offer`, Answers an `apply_remote_description`
/// des jeweils anderen Knotens. Der Task haelt beide Registries und laeuft,
/// bis er ueber das `JoinHandle` abgebrochen wird.
pub fn signaling_verbinden(
    a: &HavenNode,
    rx_a: mpsc::UnboundedReceiver<SignalingMessage>,
    b: &HavenNode,
    rx_b: mpsc::UnboundedReceiver<SignalingMessage>,
) -> JoinHandle<()> {
    let a_nach_b = weiterleiten(rx_a, a.peer_id.clone(), b.peer_id.clone(), b.registry.clone());
    let b_nach_a = weiterleiten(rx_b, b.peer_id.clone(), a.peer_id.clone(), a.registry.clone());
    tokio::spawn(async move {
        tokio::join!(a_nach_b, b_nach_a);
    })
}

async fn weiterleiten(
    mut rx: mpsc::UnboundedReceiver<SignalingMessage>,
    absender: PeerId,
    empfaenger: PeerId,
    ziel: PeerConnectionRegistry,
) {
    while let Some(nachricht) = rx.recv().await {
        if nachricht.peer_id != empfaenger {
            tracing::warn!(
                ziel = %nachricht.peer_id,
                erwartet = %empfaenger,
                "Signaling-Nachricht fuer unbekannten Knoten verworfen"
            );
            continue;
        }

        let kind = nachricht.description.kind;
        let ergebnis = match kind {
            SdpKind::Offer => ziel
                .accept_offer(&absender, nachricht.description)
                .await
                .map(|_| ()),
            SdpKind::Answer => {
                ziel.apply_remote_description(&absender, nachricht.description)
                    .await
            }
        };

        if let Err(e) = ergebnis {
            tracing::warn!(
                von = %absender,
                an = %empfaenger,
                kind = ?kind,
                fehler = %e,
                "Signaling-Weiterleitung fehlgeschlagen"
            );
        }
    }
}
