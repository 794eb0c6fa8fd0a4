//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schluessellaenge in Bytes (256 Bit)
pub const KEY_LEN: usize = 32;

/// Nonce-Laenge in Bytes (96 Bit)
pub const NONCE_LEN: usize = 12;

/// Laenge des Auth-Tags in Bytes (128 Bit)
pub const TAG_LEN: usize = 16;

/// Eine kryptografische Nonce (Number used once)
///
/// ## Aufbau
/// ```text
/// [praefix(4)] [zaehler(8, big endian)]
/// ```
/// Der Praefix wird bei der Schluessel-Generierung zufaellig gezogen,
/// der Zaehler steigt pro Verschluesselung monoton.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nonce {
    pub bytes: [u8; NONCE_LEN],
}

impl Nonce {
    /// Erstellt eine Nonce aus Schluessel-Praefix und Zaehlerstand
    pub fn aus_praefix_und_zaehler(praefix: [u8; 4], zaehler: u64) -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        bytes[0..4].copy_from_slice(&praefix);
        bytes[4..12].copy_from_slice(&zaehler.to_be_bytes());
        Self { bytes }
    }

    /// Liest eine Nonce vom Anfang eines Umschlag-Puffers
    pub fn aus_slice(daten: &[u8]) -> Option<Self> {
        let bytes: [u8; NONCE_LEN] = daten.get(..NONCE_LEN)?.try_into().ok()?;
        Some(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.bytes
    }

    /// Liest den Zaehlerstand aus der Nonce
    pub fn zaehler(&self) -> u64 {
        let mut z = [0u8; 8];
        z.copy_from_slice(&self.bytes[4..12]);
        u64::from_be_bytes(z)
    }
}

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(pub Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// AEAD-Algorithmus des Sitzungsschluessels
///
/// Beide Varianten nutzen 256-Bit-Schluessel, 96-Bit-Nonces und 128-Bit-Tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CipherAlgorithm {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    /// Kennung wie sie im Umschlag (`algorithmId`) steht
    pub fn kennung(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "CHACHA20-POLY1305",
        }
    }

    /// Ermittelt den Algorithmus aus einer Umschlag-Kennung
    pub fn aus_kennung(kennung: &str) -> Option<Self> {
        match kennung {
            "AES-256-GCM" => Some(Self::Aes256Gcm),
            "CHACHA20-POLY1305" => Some(Self::ChaCha20Poly1305),
            _ => None,
        }
    }
}

impl std::fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kennung())
    }
}

/// Verschluesselter Umschlag wie er ueber den Kanal geht
///
/// `ciphertext_base64` enthaelt `nonce(12) || ciphertext || tag(16)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub ciphertext_base64: String,
    pub algorithm_id: String,
    pub created_at_millis: i64,
}

/// Beschreibung der Verschluesselungsparameter fuer Audit-Logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub algorithm: CipherAlgorithm,
    pub key_bits: u32,
    pub nonce_bits: u32,
    pub tag_bits: u32,
    pub timestamp: DateTime<Utc>,
}
