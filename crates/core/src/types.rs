//! Gemeinsame Identifikationstypen fuer Haven
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Praefix generierter Peer-IDs
const PEER_PRAEFIX: &str = "peer-";

/// Laenge des Zufallsanteils generierter Peer-IDs
const PEER_ZUFALL_LAENGE: usize = 9;

/// Opake Kennung eines entfernten Teilnehmers
///
/// Stabil fuer die Dauer einer Unterhaltung (z.B. eine Therapeut/Patient-Paarung).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Erstellt eine PeerId aus einer beliebigen Zeichenkette
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generiert eine zufaellige lokale PeerId der Form `peer-xxxxxxxxx`
    pub fn generieren() -> Self {
        let zufall = Uuid::new_v4().simple().to_string();
        Self(format!("{PEER_PRAEFIX}{}", &zufall[..PEER_ZUFALL_LAENGE]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Eindeutige Nachrichten-ID (lokal vergeben)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Erstellt eine neue zufaellige MessageId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "message:{}", self.0)
    }
}

/// Richtung einer Kanal-Nachricht aus Sicht des lokalen Teilnehmers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Aktuelle Wanduhrzeit in Millisekunden seit der Unix-Epoche
pub fn jetzt_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_generieren_format() {
        let id = PeerId::generieren();
        assert!(id.as_str().starts_with("peer-"));
        assert_eq!(id.as_str().len(), PEER_PRAEFIX.len() + PEER_ZUFALL_LAENGE);
    }

    #[test]
    fn peer_id_eindeutig() {
        let a = PeerId::generieren();
        let b = PeerId::generieren();
        assert_ne!(a, b, "Zwei generierte PeerIds muessen verschieden sein");
    }

    #[test]
    fn peer_id_ist_transparent_serialisiert() {
        let id = PeerId::from("patient-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"patient-1\"");
        let zurueck: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }

    #[test]
    fn message_id_display() {
        let id = MessageId(Uuid::nil());
        assert!(id.to_string().starts_with("message:"));
    }

    #[test]
    fn direction_serde() {
        let json = serde_json::to_string(&Direction::Inbound).unwrap();
        assert_eq!(json, "\"inbound\"");
    }

    #[test]
    fn jetzt_millis_ist_plausibel() {
        // 2023-11-14 als untere Schranke
        assert!(jetzt_millis() > 1_700_000_000_000);
    }
}
