//! Test-Suiten und gemeinsame Hilfsfunktionen

mod session_tests;

use std::sync::Arc;
use std::time::Duration;

use haven_core::PeerId;
use haven_crypto::KeyedCipher;
use haven_peer::{
    ChannelSignaling, MemoryHandle, MemoryNetwork, PeerConfig, PeerConnectionRegistry,
    PeerConnectionState, SignalingMessage,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{DecryptedMessage, IncomingEvent, SecureMessagingSession, SensitiveContentDetector};

pub(crate) const WARTEZEIT: Duration = Duration::from_secs(2);

pub(crate) fn initialisierter_cipher() -> Arc<KeyedCipher> {
    let cipher = Arc::new(KeyedCipher::default());
    cipher.initialize().expect("Cipher initialisieren fehlgeschlagen");
    cipher
}

/// Sitzung `lokal` auf einem eigenen In-Memory-Netz
pub(crate) struct Aufbau {
    pub netz: MemoryNetwork,
    pub session: SecureMessagingSession,
    pub _signale: mpsc::UnboundedReceiver<SignalingMessage>,
}

pub(crate) fn aufbau(cipher: Arc<KeyedCipher>) -> Aufbau {
    let netz = MemoryNetwork::neu();
    let (sink, signale) = ChannelSignaling::neu();
    let registry = PeerConnectionRegistry::neu(
        PeerConfig::default(),
        Arc::new(netz.factory("lokal")),
        Arc::new(sink),
    );
    let session = SecureMessagingSession::neu(cipher, registry, SensitiveContentDetector::neu());
    Aufbau {
        netz,
        session,
        _signale: signale,
    }
}

impl Aufbau {
    /// Legt eine Verbindung an und meldet sie ueber das Test-Handle als verbunden
    pub async fn verbinden(&self, peer: &str) -> MemoryHandle {
        let peer = PeerId::from(peer);
        self.session
            .registry()
            .get_or_create(&peer)
            .expect("get_or_create fehlgeschlagen");
        let handle = self
            .netz
            .handle(&PeerId::from("lokal"), &peer)
            .expect("Kein Transport registriert");
        handle.connect();

        let registry = self.session.registry().clone();
        warten_bis(|| registry.state(&peer) == Some(PeerConnectionState::Connected)).await;
        handle
    }
}

pub(crate) async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    tokio::time::timeout(WARTEZEIT, async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Bedingung nicht rechtzeitig erfuellt");
}

/// Vereinfachte Sicht auf ein IncomingEvent fuer Vergleiche
#[derive(Debug, Clone)]
pub(crate) enum Empfangen {
    Nachricht(DecryptedMessage),
    Fehler { integritaet: bool },
}

pub(crate) fn sammler() -> (
    Arc<Mutex<Vec<Empfangen>>>,
    impl Fn(&IncomingEvent) + Send + Sync + 'static,
) {
    let liste = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&liste);
    let listener = move |e: &IncomingEvent| {
        let eintrag = match e {
            IncomingEvent::Message(m) => Empfangen::Nachricht(m.clone()),
            IncomingEvent::DecryptionFailed { error, .. } => Empfangen::Fehler {
                integritaet: error.ist_integritaetsfehler(),
            },
        };
        l.lock().push(eintrag);
    };
    (liste, listener)
}
