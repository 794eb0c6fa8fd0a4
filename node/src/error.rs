//! Fehlertypen des Knotens

use haven_crypto::CryptoError;
use haven_messaging::MessagingError;
use haven_peer::PeerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Konfigurationsfehler: {0}")]
    Config(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

pub type NodeResult<T> = Result<T, NodeError>;
