//! haven-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die Identifikationstypen bereit, die von Krypto-,
//! Peer- und Messaging-Schicht gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{jetzt_millis, Direction, MessageId, PeerId};
