//! Fehlertypen fuer das Messaging-Crate

use haven_crypto::CryptoError;
use haven_peer::PeerError;
use thiserror::Error;

/// Messaging-Fehlertypen
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Kryptografie-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Verbindungsfehler: {0}")]
    Peer(#[from] PeerError),

    #[error("Ungueltige Eingabe: {0}")]
    InvalidInput(String),

    #[error("Serialisierungsfehler: {0}")]
    Serialization(String),
}

pub type MessagingResult<T> = Result<T, MessagingError>;
