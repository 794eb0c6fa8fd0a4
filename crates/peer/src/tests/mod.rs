//! Test-Suiten und gemeinsame Hilfsfunktionen


use std::sync::Arc;
use std::time::Duration;

use haven_core::PeerId;
use haven_crypto::EncryptedEnvelope;
use tokio::sync::mpsc;

use crate::{
    ChannelSignaling, MemoryHandle, MemoryNetwork, PeerConfig, PeerConnection,
    PeerConnectionState, SignalingMessage,
};

pub(crate) const WARTEZEIT: Duration = Duration::from_secs(2);

pub(crate) fn lokal() -> PeerId {
    PeerId::from("lokal")
}

/// Einzelne Verbindung `lokal -> remote` auf einem eigenen Netz
pub(crate) struct Aufbau {
    pub netz: MemoryNetwork,
    pub verbindung: PeerConnection,
    pub handle: MemoryHandle,
    pub signal_rx: mpsc::UnboundedReceiver<SignalingMessage>,
}

pub(crate) fn aufbau(remote: &str) -> Aufbau {
    let netz = MemoryNetwork::neu();
    let (sink, signal_rx) = ChannelSignaling::neu();
    let remote = PeerId::from(remote);
    let verbindung = PeerConnection::neu(
        remote.clone(),
        &PeerConfig::default(),
        &netz.factory(lokal()),
        Arc::new(sink),
        None,
    )
    .expect("Verbindung anlegen fehlgeschlagen");
    let handle = netz
        .handle(&lokal(), &remote)
        .expect("Kein Transport fuer lokal -> remote");

    Aufbau {
        netz,
        verbindung,
        handle,
        signal_rx,
    }
}

/// Bringt eine Verbindung ohne Signaling in den Zustand Connected
pub(crate) async fn verbunden(verbindung: &PeerConnection, handle: &MemoryHandle) {
    verbindung
        .aufbau_beginnen()
        .expect("Aufbau beginnen fehlgeschlagen");
    handle.connect();
    warten_auf_zustand(verbindung, PeerConnectionState::Connected).await;
}

pub(crate) async fn warten_auf_zustand(verbindung: &PeerConnection, ziel: PeerConnectionState) {
    let mut rx = verbindung.subscribe_state();
    tokio::time::timeout(WARTEZEIT, async {
        while *rx.borrow_and_update() != ziel {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Zustand {ziel} nicht erreicht (aktuell {})", verbindung.state()));
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

pub(crate) async fn signal_empfangen(
    rx: &mut mpsc::UnboundedReceiver<SignalingMessage>,
) -> SignalingMessage {
    tokio::time::timeout(WARTEZEIT, rx.recv())
        .await
        .expect("Keine Signaling-Nachricht erhalten")
        .expect("Signaling-Kanal geschlossen")
}

/// Test-Umschlag; `created_at_millis` dient als Kennung
pub(crate) fn umschlag(n: i64) -> EncryptedEnvelope {
    EncryptedEnvelope {
        ciphertext_base64: format!("Y3Qt{n}"),
        algorithm_id: "AES-256-GCM".into(),
        created_at_millis: n,
    }
}
