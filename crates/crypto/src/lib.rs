//! # haven-crypto
//!
//! Sitzungsgebundene Verschluesselung fuer Haven.
//!
//! ## Module
//! - `cipher` - `KeyedCipher`: Schluessel-Lebenszyklus, AEAD encrypt/decrypt
//! - `types` - Gemeinsame Typen (Nonce, SecretBytes, EncryptedEnvelope, etc.)
//! - `error` - Fehlertypen
//!
//! ## Ablauf
//! 1. `KeyedCipher::initialize` erzeugt einen fluechtigen 256-Bit-Schluessel
//! 2. `encrypt` serialisiert den Payload als JSON und versiegelt ihn (AEAD)
//! 3. Der Umschlag (`EncryptedEnvelope`) traegt `nonce || ciphertext || tag` als Base64
//! 4. `decrypt` verifiziert den Auth-Tag bevor Klartext herausgegeben wird
//!
//! Der Schluessel wird nie persistiert. Nach einem Neustart sind alte
//! Umschlaege nicht mehr entschluesselbar.

pub mod cipher;
pub mod error;
pub mod types;

// Bequeme Re-Exports
pub use cipher::KeyedCipher;
pub use error::{CryptoError, CryptoResult};
pub use types::{CipherAlgorithm, EncryptedEnvelope, EncryptionMetadata, Nonce, SecretBytes};
