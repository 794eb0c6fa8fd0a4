//! SecureMessagingSession – Verschluesseln, Senden, Entschluesseln

use std::sync::Arc;

use haven_core::PeerId;
use haven_crypto::KeyedCipher;
use haven_peer::{ChannelMessage, PeerConnectionRegistry, Subscription};
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{MessagingError, MessagingResult},
    sensitive::SensitiveContentDetector,
    types::{DecryptedMessage, IncomingEvent, MessagePayload, OutboundMessage},
};

/// Standard-Maximallaenge einer Text-Nachricht in Zeichen
pub const STANDARD_MAX_LAENGE: usize = 4096;

/// Verbindet KeyedCipher und PeerConnectionRegistry
///
/// Ausgehende Payloads werden auf sensible Inhalte geprueft, verschluesselt
/// und ueber die Registry gesendet. Eingehende Umschlaege werden vor der
/// Zustellung an Listener entschluesselt.
#[derive(Clone)]
pub struct SecureMessagingSession {
    cipher: Arc<KeyedCipher>,
    registry: PeerConnectionRegistry,
    detector: Arc<SensitiveContentDetector>,
    max_laenge: usize,
}

impl SecureMessagingSession {
    pub fn neu(
        cipher: Arc<KeyedCipher>,
        registry: PeerConnectionRegistry,
        detector: SensitiveContentDetector,
    ) -> Self {
        Self {
            cipher,
            registry,
            detector: Arc::new(detector),
            max_laenge: STANDARD_MAX_LAENGE,
        }
    }

    /// Setzt die Maximallaenge fuer `send_text`
    pub fn mit_max_laenge(mut self, max_laenge: usize) -> Self {
        self.max_laenge = max_laenge;
        self
    }

    pub fn cipher(&self) -> &Arc<KeyedCipher> {
        &self.cipher
    }

    pub fn registry(&self) -> &PeerConnectionRegistry {
        &self.registry
    }

    pub fn max_laenge(&self) -> usize {
        self.max_laenge
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Prueft, verschluesselt und sendet einen beliebigen Payload
    ///
    /// Ein Hinweis auf sensible Inhalte blockiert das Senden nicht. Ist der
    /// Kanal nicht bereit, ist `delivered == false`; gepuffert wird nicht.
    pub fn send_message<T: Serialize + ?Sized>(
        &self,
        peer_id: &PeerId,
        payload: &T,
    ) -> MessagingResult<OutboundMessage> {
        let advisory = self.detector.pruefen(payload)?;
        if let Some(hinweis) = &advisory {
            let arten: Vec<&str> = hinweis.kinds.iter().map(|k| k.als_str()).collect();
            tracing::warn!(
                peer_id = %peer_id,
                arten = ?arten,
                "Moeglicherweise sensible Inhalte in ausgehender Nachricht"
            );
        }

        let umschlag = self.cipher.encrypt(payload)?;
        let delivered = self.registry.send(peer_id, &umschlag)?;
        if !delivered {
            tracing::debug!(peer_id = %peer_id, "Kanal nicht bereit, Nachricht nicht zugestellt");
        }

        Ok(OutboundMessage {
            message: ChannelMessage::ausgehend(peer_id.clone(), umschlag),
            advisory,
            delivered,
        })
    }

    /// Sendet eine Text-Nachricht als `MessagePayload`
    pub fn send_text(&self, peer_id: &PeerId, text: &str) -> MessagingResult<OutboundMessage> {
        if text.trim().is_empty() {
            return Err(MessagingError::InvalidInput(
                "Nachrichteninhalt darf nicht leer sein".into(),
            ));
        }

        let zeichen = text.chars().count();
        if zeichen > self.max_laenge {
            return Err(MessagingError::InvalidInput(format!(
                "Nachricht zu lang: {} Zeichen (Maximum: {})",
                zeichen, self.max_laenge
            )));
        }

        self.send_message(peer_id, &MessagePayload::text(text))
    }

    // -----------------------------------------------------------------------
    // Empfangen
    // -----------------------------------------------------------------------

    /// Registriert einen Listener fuer entschluesselte Nachrichten
    ///
    /// Fehlgeschlagene Entschluesselung wird als `IncomingEvent::DecryptionFailed`
    /// gemeldet, nachfolgende Nachrichten werden weiter zugestellt.
    pub fn on_incoming<F>(&self, peer_id: &PeerId, listener: F) -> Subscription
    where
        F: Fn(&IncomingEvent) + Send + Sync + 'static,
    {
        let cipher = Arc::clone(&self.cipher);
        self.registry.on_message(peer_id, move |nachricht| {
            let ereignis = entschluesseln(&cipher, nachricht);
            listener(&ereignis);
        })
    }
}

fn entschluesseln(cipher: &KeyedCipher, nachricht: &ChannelMessage) -> IncomingEvent {
    match cipher.decrypt::<Value>(&nachricht.payload) {
        Ok(payload) => IncomingEvent::Message(DecryptedMessage {
            id: nachricht.id,
            peer_id: nachricht.peer_id.clone(),
            payload,
            sent_at_millis: nachricht.payload.created_at_millis,
            received_at_millis: nachricht.timestamp_millis,
        }),
        Err(e) => {
            tracing::warn!(
                peer_id = %nachricht.peer_id,
                message_id = %nachricht.id,
                fehler = %e,
                "Nachricht konnte nicht entschluesselt werden"
            );
            IncomingEvent::DecryptionFailed {
                message_id: nachricht.id,
                peer_id: nachricht.peer_id.clone(),
                error: e,
            }
        }
    }
}
