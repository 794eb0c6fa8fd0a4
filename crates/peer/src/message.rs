//! Nachrichten auf dem Datenkanal

use haven_core::{jetzt_millis, Direction, MessageId, PeerId};
use haven_crypto::EncryptedEnvelope;
use serde::{Deserialize, Serialize};

/// Eine verschluesselte Nachricht auf dem Kanal einer Verbindung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub id: MessageId,
    pub peer_id: PeerId,
    pub payload: EncryptedEnvelope,
    pub direction: Direction,
    /// Empfangs- bzw. Sendezeitpunkt
    pub timestamp_millis: i64,
}

impl ChannelMessage {
    pub fn eingehend(peer_id: PeerId, payload: EncryptedEnvelope) -> Self {
        Self::neu(peer_id, payload, Direction::Inbound)
    }

    pub fn ausgehend(peer_id: PeerId, payload: EncryptedEnvelope) -> Self {
        Self::neu(peer_id, payload, Direction::Outbound)
    }

    fn neu(peer_id: PeerId, payload: EncryptedEnvelope, direction: Direction) -> Self {
        Self {
            id: MessageId::new(),
            peer_id,
            payload,
            direction,
            timestamp_millis: jetzt_millis(),
        }
    }
}
