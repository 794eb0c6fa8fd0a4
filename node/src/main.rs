//! Haven Knoten – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet zwei
//! Loopback-Knoten, die eine verschluesselte Nachricht austauschen.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use haven_messaging::IncomingEvent;
use haven_node::{signaling_verbinden, HavenConfig, HavenNode};
use haven_observability::logging_initialisieren;
use haven_peer::MemoryNetwork;
use tokio::sync::mpsc;

/// Wartezeit fuer Verbindungsaufbau und Zustellung
const ZEITLIMIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = HavenConfig::pfad_aus_env();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let mut config = HavenConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Haven Knoten wird initialisiert"
    );

    // Beide Knoten erzeugen ihre Peer-ID selbst
    config.knoten.lokale_peer_id = None;

    let netz = MemoryNetwork::neu();
    let cipher = HavenNode::cipher_erzeugen(&config)?;
    let (alice, rx_alice) = HavenNode::lokal(config.clone(), &netz, Arc::clone(&cipher))?;
    let (bob, rx_bob) = HavenNode::lokal(config, &netz, cipher)?;
    let weiterleitung = signaling_verbinden(&alice, rx_alice, &bob, rx_bob);

    // connect() hat kein eigenes Zeitlimit
    match tokio::time::timeout(ZEITLIMIT, alice.registry().connect(bob.peer_id())).await {
        Ok(ergebnis) => {
            ergebnis.context("Verbindungsaufbau fehlgeschlagen")?;
        }
        Err(_) => {
            alice.registry().end_call(bob.peer_id());
            weiterleitung.abort();
            bail!("Verbindungsaufbau nach {ZEITLIMIT:?} abgebrochen");
        }
    }
    tracing::info!(von = %alice.peer_id(), an = %bob.peer_id(), "Loopback-Verbindung steht");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _abo = bob.session().on_incoming(alice.peer_id(), move |ereignis| {
        let eintrag = match ereignis {
            IncomingEvent::Message(m) => Ok(m.clone()),
            IncomingEvent::DecryptionFailed { error, .. } => Err(error.to_string()),
        };
        let _ = tx.send(eintrag);
    });

    let gesendet = alice
        .session()
        .send_text(bob.peer_id(), "Hallo Bob, ruf mich an: 555-123-4567")?;
    tracing::info!(
        message_id = %gesendet.message.id,
        zugestellt = gesendet.delivered,
        hinweis = gesendet.advisory.is_some(),
        "Nachricht gesendet"
    );
    if let Some(hinweis) = &gesendet.advisory {
        println!("Hinweis: {}", hinweis.meldung());
    }

    match tokio::time::timeout(ZEITLIMIT, rx.recv()).await {
        Ok(Some(Ok(nachricht))) => {
            tracing::info!(
                message_id = %nachricht.id,
                laufzeit_ms = nachricht.received_at_millis - nachricht.sent_at_millis,
                "Nachricht entschluesselt"
            );
            println!("Echo bei {}: {}", bob.peer_id(), nachricht.text().unwrap_or_default());
        }
        Ok(Some(Err(fehler))) => bail!("Entschluesselung fehlgeschlagen: {fehler}"),
        Ok(None) | Err(_) => bail!("Keine Nachricht innerhalb von {ZEITLIMIT:?} empfangen"),
    }

    alice.registry().end_call(bob.peer_id());
    alice.herunterfahren();
    bob.herunterfahren();
    weiterleitung.abort();

    tracing::info!("Loopback-Demo beendet");
    Ok(())
}
