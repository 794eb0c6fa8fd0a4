//! haven-messaging – Verschluesselte Nachrichten zwischen Peers
//!
//! Dieses Crate implementiert:
//! - SecureMessagingSession: Payload pruefen, verschluesseln, ueber die Registry senden
//! - SensitiveContentDetector: Hinweise auf sensible Daten (informativ, nicht blockierend)
//! - Payload- und Ereignistypen fuer eingehende Nachrichten
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use haven_core::PeerId;
//! use haven_crypto::KeyedCipher;
//! use haven_messaging::{SecureMessagingSession, SensitiveContentDetector};
//! use haven_peer::{ChannelSignaling, MemoryNetwork, PeerConfig, PeerConnectionRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cipher = Arc::new(KeyedCipher::default());
//!     cipher.initialize().unwrap();
//!
//!     let netz = MemoryNetwork::neu();
//!     let (sink, _signale) = ChannelSignaling::neu();
//!     let registry = PeerConnectionRegistry::neu(
//!         PeerConfig::default(),
//!         Arc::new(netz.factory("lokal")),
//!         Arc::new(sink),
//!     );
//!
//!     let session = SecureMessagingSession::neu(cipher, registry, SensitiveContentDetector::neu());
//!     let peer = PeerId::from("peer-abc");
//!     session.registry().connect(&peer).await.unwrap();
//!     let gesendet = session.send_text(&peer, "Hallo").unwrap();
//!     assert!(gesendet.delivered);
//! }
//! ```

pub mod error;
pub mod sensitive;
pub mod session;
pub mod types;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use error::{MessagingError, MessagingResult};
pub use sensitive::{SensitiveAdvisory, SensitiveContentDetector, SensitiveKind};
pub use session::{SecureMessagingSession, STANDARD_MAX_LAENGE};
pub use types::{DecryptedMessage, IncomingEvent, MessagePayload, OutboundMessage, NACHRICHTEN_TYP};
