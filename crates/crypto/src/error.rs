//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
///
/// Krypto- und Umschlagfehler werden immer an den direkten Aufrufer
/// weitergereicht, nie verschluckt.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    KeyGeneration(String),

    #[error("Cipher nicht initialisiert")]
    NotInitialized,

    #[error("Authentifizierung fehlgeschlagen: Auth-Tag ungueltig (manipuliert oder falscher Schluessel)")]
    Authentication,

    #[error("Ungueltiger Umschlag: {0}")]
    MalformedEnvelope(String),

    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialization(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Encryption(String),

    #[error("Nonce-Raum fuer diesen Schluessel erschoepft")]
    NonceExhausted,
}

impl CryptoError {
    /// Gibt true zurueck wenn der Fehler auf Manipulation oder einen
    /// falschen Schluessel hindeutet
    pub fn ist_integritaetsfehler(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
