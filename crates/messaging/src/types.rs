//! Datentypen der Nachrichten-Sitzung

use haven_core::{jetzt_millis, MessageId, PeerId};
use haven_crypto::CryptoError;
use haven_peer::ChannelMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MessagingError, MessagingResult};
use crate::sensitive::SensitiveAdvisory;

/// Typ-Kennung fuer Text-Nachrichten im Payload
pub const NACHRICHTEN_TYP: &str = "message";

/// Klartext-Payload einer Chat-Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub text: String,
    /// Erstellungszeitpunkt in Millisekunden seit Epoch
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub typ: String,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: jetzt_millis(),
            typ: NACHRICHTEN_TYP.to_string(),
        }
    }
}

/// Ergebnis von `send_message` fuer das lokale Echo
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Lokal aufgezeichnete, verschluesselte Nachricht
    pub message: ChannelMessage,
    /// Hinweis auf sensible Inhalte, falls erkannt
    pub advisory: Option<SensitiveAdvisory>,
    /// `false` wenn der Kanal nicht bereit war (kein Puffern)
    pub delivered: bool,
}

/// Entschluesselte eingehende Nachricht
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedMessage {
    pub id: MessageId,
    pub peer_id: PeerId,
    pub payload: Value,
    /// Zeitstempel des Umschlags beim Absender
    pub sent_at_millis: i64,
    pub received_at_millis: i64,
}

impl DecryptedMessage {
    /// Deserialisiert den Payload in einen konkreten Typ
    pub fn als<T: DeserializeOwned>(&self) -> MessagingResult<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| MessagingError::Serialization(e.to_string()))
    }

    /// Text, falls der Payload eine `MessagePayload` ist
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }
}

/// Ereignis fuer Empfangs-Listener
#[derive(Debug)]
pub enum IncomingEvent {
    Message(DecryptedMessage),
    /// Umschlag konnte nicht entschluesselt werden; der Kanal bleibt offen
    DecryptionFailed {
        message_id: MessageId,
        peer_id: PeerId,
        error: CryptoError,
    },
}

impl IncomingEvent {
    pub fn peer_id(&self) -> &PeerId {
        match self {
            Self::Message(m) => &m.peer_id,
            Self::DecryptionFailed { peer_id, .. } => peer_id,
        }
    }

    pub fn nachricht(&self) -> Option<&DecryptedMessage> {
        match self {
            Self::Message(m) => Some(m),
            Self::DecryptionFailed { .. } => None,
        }
    }
}
