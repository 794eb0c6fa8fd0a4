//! KeyedCipher – Sitzungsschluessel und AEAD-Verschluesselung
//!
//! Haelt genau einen symmetrischen Schluessel fuer die Lebensdauer des
//! Prozesses und versiegelt beliebige JSON-serialisierbare Payloads.
//!
//! ## Umschlag-Format
//! ```text
//! base64( [nonce(12)] [ciphertext] [auth_tag(16)] )
//! ```
//!
//! ## Nonce-Aufbau
//! ```text
//! [praefix(4, zufaellig pro Schluessel)] [zaehler(8)]
//! ```
//! Der Zaehler wird atomar erhoeht, damit parallele `encrypt`-Aufrufe
//! niemals dieselbe Nonce verwenden.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{
    CipherAlgorithm, EncryptedEnvelope, EncryptionMetadata, Nonce, SecretBytes, KEY_LEN, NONCE_LEN,
    TAG_LEN,
};

/// Aktiver Sitzungsschluessel samt Nonce-Zustand
struct AktiverSchluessel {
    key_bytes: SecretBytes,
    nonce_praefix: [u8; 4],
    zaehler: AtomicU64,
}

impl AktiverSchluessel {
    fn erzeugen() -> CryptoResult<Self> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let mut nonce_praefix = [0u8; 4];
        OsRng
            .try_fill_bytes(&mut nonce_praefix)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            key_bytes: SecretBytes::new(key),
            nonce_praefix,
            zaehler: AtomicU64::new(0),
        })
    }

    /// Zieht die naechste unbenutzte Nonce
    fn naechste_nonce(&self) -> CryptoResult<Nonce> {
        let zaehler = self
            .zaehler
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |z| z.checked_add(1))
            .map_err(|_| CryptoError::NonceExhausted)?;
        Ok(Nonce::aus_praefix_und_zaehler(self.nonce_praefix, zaehler))
    }
}

/// Sitzungsgebundener AEAD-Cipher
///
/// Wird einmalig per `initialize` mit einem frischen Schluessel versehen.
/// Danach teilen sich alle `encrypt`/`decrypt`-Aufrufe den Schluessel lesend.
/// Ein erneutes `initialize` ersetzt den Schluessel, aeltere Umschlaege sind
/// damit nicht mehr entschluesselbar.
pub struct KeyedCipher {
    algorithm: CipherAlgorithm,
    schluessel: RwLock<Option<Arc<AktiverSchluessel>>>,
}

impl KeyedCipher {
    /// Erstellt einen uninitialisierten Cipher fuer den gegebenen Algorithmus
    pub fn new(algorithm: CipherAlgorithm) -> Self {
        Self {
            algorithm,
            schluessel: RwLock::new(None),
        }
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Erzeugt einen frischen Sitzungsschluessel
    ///
    /// Schlaegt mit `KeyGeneration` fehl wenn die Zufallsquelle des Systems
    /// nicht verfuegbar ist.
    pub fn initialize(&self) -> CryptoResult<()> {
        let neu = Arc::new(AktiverSchluessel::erzeugen()?);
        let ersetzt = self.schluessel.write().replace(neu).is_some();
        if ersetzt {
            tracing::warn!(
                algorithm = %self.algorithm,
                "Sitzungsschluessel ersetzt – bestehende Umschlaege nicht mehr entschluesselbar"
            );
        } else {
            tracing::info!(algorithm = %self.algorithm, "Sitzungsschluessel erzeugt");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.schluessel.read().is_some()
    }

    fn aktiver_schluessel(&self) -> CryptoResult<Arc<AktiverSchluessel>> {
        self.schluessel
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(CryptoError::NotInitialized)
    }

    /// Verschluesselt einen beliebigen serialisierbaren Payload
    pub fn encrypt<T: Serialize + ?Sized>(&self, data: &T) -> CryptoResult<EncryptedEnvelope> {
        let schluessel = self.aktiver_schluessel()?;

        let klartext =
            serde_json::to_vec(data).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        let nonce = schluessel.naechste_nonce()?;

        let ciphertext = match self.algorithm {
            CipherAlgorithm::Aes256Gcm => {
                encrypt_aes256gcm(&klartext, schluessel.key_bytes.as_bytes(), nonce.as_bytes())?
            }
            CipherAlgorithm::ChaCha20Poly1305 => {
                encrypt_chacha20(&klartext, schluessel.key_bytes.as_bytes(), nonce.as_bytes())?
            }
        };

        let mut kombiniert = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        kombiniert.extend_from_slice(nonce.as_bytes());
        kombiniert.extend_from_slice(&ciphertext);

        Ok(EncryptedEnvelope {
            ciphertext_base64: STANDARD.encode(&kombiniert),
            algorithm_id: self.algorithm.kennung().to_string(),
            created_at_millis: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Entschluesselt einen Umschlag
    ///
    /// Verifiziert den Auth-Tag bevor irgendein Klartext zurueckgegeben wird.
    /// - `MalformedEnvelope` bei strukturell ungueltiger Eingabe
    /// - `Authentication` bei Manipulation oder falschem Schluessel
    pub fn decrypt<T: DeserializeOwned>(&self, envelope: &EncryptedEnvelope) -> CryptoResult<T> {
        let schluessel = self.aktiver_schluessel()?;

        match CipherAlgorithm::aus_kennung(&envelope.algorithm_id) {
            Some(alg) if alg == self.algorithm => {}
            Some(alg) => {
                return Err(CryptoError::MalformedEnvelope(format!(
                    "Algorithmus {alg} passt nicht zum Sitzungsschluessel ({})",
                    self.algorithm
                )))
            }
            None => {
                return Err(CryptoError::MalformedEnvelope(format!(
                    "Unbekannter Algorithmus: {}",
                    envelope.algorithm_id
                )))
            }
        }

        let kombiniert = STANDARD
            .decode(envelope.ciphertext_base64.as_bytes())
            .map_err(|e| CryptoError::MalformedEnvelope(format!("Base64: {e}")))?;

        if kombiniert.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "Umschlag zu kurz: {} Bytes (Minimum: {})",
                kombiniert.len(),
                NONCE_LEN + TAG_LEN
            )));
        }

        let nonce = Nonce::aus_slice(&kombiniert)
            .ok_or_else(|| CryptoError::MalformedEnvelope("Nonce fehlt".into()))?;
        let ciphertext = &kombiniert[NONCE_LEN..];

        let klartext = match self.algorithm {
            CipherAlgorithm::Aes256Gcm => {
                decrypt_aes256gcm(ciphertext, schluessel.key_bytes.as_bytes(), nonce.as_bytes())?
            }
            CipherAlgorithm::ChaCha20Poly1305 => {
                decrypt_chacha20(ciphertext, schluessel.key_bytes.as_bytes(), nonce.as_bytes())?
            }
        };

        serde_json::from_slice(&klartext).map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    /// Exportiert den Rohschluessel als Base64 (nur fuer fluechtige Anzeige/Debugging)
    pub fn export_key(&self) -> CryptoResult<String> {
        let schluessel = self.aktiver_schluessel()?;
        Ok(STANDARD.encode(schluessel.key_bytes.as_bytes()))
    }

    /// Verschluesselungsparameter fuer Audit-Logs
    pub fn metadata(&self) -> EncryptionMetadata {
        EncryptionMetadata {
            algorithm: self.algorithm,
            key_bits: (KEY_LEN * 8) as u32,
            nonce_bits: (NONCE_LEN * 8) as u32,
            tag_bits: (TAG_LEN * 8) as u32,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl Default for KeyedCipher {
    fn default() -> Self {
        Self::new(CipherAlgorithm::default())
    }
}

impl std::fmt::Debug for KeyedCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedCipher")
            .field("algorithm", &self.algorithm)
            .field("initialisiert", &self.is_initialized())
            .finish()
    }
}

fn encrypt_aes256gcm(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; NONCE_LEN],
) -> CryptoResult<Vec<u8>> {
    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = AesNonce::from_slice(nonce_bytes);

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

fn encrypt_chacha20(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; NONCE_LEN],
) -> CryptoResult<Vec<u8>> {
    let key = ChaChaKey::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);
    let nonce = ChaChaNonce::from_slice(nonce_bytes);

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

fn decrypt_aes256gcm(
    ciphertext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; NONCE_LEN],
) -> CryptoResult<Vec<u8>> {
    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = AesNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

fn decrypt_chacha20(
    ciphertext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; NONCE_LEN],
) -> CryptoResult<Vec<u8>> {
    let key = ChaChaKey::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);
    let nonce = ChaChaNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashSet;

    fn bereiter_cipher() -> KeyedCipher {
        let cipher = KeyedCipher::default();
        cipher.initialize().unwrap();
        cipher
    }

    fn umschlag_bytes(env: &EncryptedEnvelope) -> Vec<u8> {
        STANDARD.decode(env.ciphertext_base64.as_bytes()).unwrap()
    }

    #[test]
    fn roundtrip_hello_szenario() {
        let cipher = bereiter_cipher();
        let original = json!({ "text": "hello", "timestamp": 1_700_000_000_000i64 });

        let env = cipher.encrypt(&original).unwrap();
        assert!(!env.ciphertext_base64.is_empty());
        let klartext_b64 = STANDARD.encode(serde_json::to_vec(&original).unwrap());
        assert_ne!(env.ciphertext_base64, klartext_b64);
        assert_eq!(env.algorithm_id, "AES-256-GCM");

        let zurueck: Value = cipher.decrypt(&env).unwrap();
        assert_eq!(zurueck, original);
    }

    #[test]
    fn roundtrip_verschiedene_werte() {
        let cipher = bereiter_cipher();
        let werte = vec![
            json!(null),
            json!(true),
            json!(42),
            json!(-3.5),
            json!(""),
            json!("Umlaute äöü und Emoji 🔒"),
            json!([1, "zwei", { "drei": [] }]),
            json!({ "verschachtelt": { "tief": { "liste": [null, false] } } }),
        ];
        for wert in werte {
            let env = cipher.encrypt(&wert).unwrap();
            let zurueck: Value = cipher.decrypt(&env).unwrap();
            assert_eq!(zurueck, wert);
        }
    }

    #[test]
    fn roundtrip_chacha20() {
        let cipher = KeyedCipher::new(CipherAlgorithm::ChaCha20Poly1305);
        cipher.initialize().unwrap();
        let env = cipher.encrypt(&json!({ "text": "chacha" })).unwrap();
        assert_eq!(env.algorithm_id, "CHACHA20-POLY1305");
        let zurueck: Value = cipher.decrypt(&env).unwrap();
        assert_eq!(zurueck["text"], "chacha");
    }

    #[test]
    fn umschlag_layout_nonce_ciphertext_tag() {
        let cipher = bereiter_cipher();
        let klartext = serde_json::to_vec(&json!("abc")).unwrap();
        let env = cipher.encrypt(&json!("abc")).unwrap();
        assert_eq!(umschlag_bytes(&env).len(), NONCE_LEN + klartext.len() + TAG_LEN);
    }

    #[test]
    fn nicht_initialisiert() {
        let cipher = KeyedCipher::default();
        assert!(!cipher.is_initialized());
        assert!(matches!(
            cipher.encrypt(&json!(1)),
            Err(CryptoError::NotInitialized)
        ));
        let env = bereiter_cipher().encrypt(&json!(1)).unwrap();
        assert!(matches!(
            cipher.decrypt::<Value>(&env),
            Err(CryptoError::NotInitialized)
        ));
        assert!(matches!(cipher.export_key(), Err(CryptoError::NotInitialized)));
    }

    #[test]
    fn jedes_gekippte_bit_wird_abgelehnt() {
        let cipher = bereiter_cipher();
        let env = cipher.encrypt(&json!({ "text": "manipulier mich" })).unwrap();
        let bytes = umschlag_bytes(&env);

        // Ciphertext- und Tag-Bereich (alles nach der Nonce)
        for index in NONCE_LEN..bytes.len() {
            for bit in 0..8 {
                let mut manipuliert = bytes.clone();
                manipuliert[index] ^= 1 << bit;
                let env_m = EncryptedEnvelope {
                    ciphertext_base64: STANDARD.encode(&manipuliert),
                    ..env.clone()
                };
                let result = cipher.decrypt::<Value>(&env_m);
                assert!(
                    matches!(result, Err(CryptoError::Authentication)),
                    "Bit {bit} in Byte {index} wurde nicht erkannt"
                );
            }
        }
    }

    #[test]
    fn manipulierte_nonce_wird_abgelehnt() {
        let cipher = bereiter_cipher();
        let env = cipher.encrypt(&json!("nonce")).unwrap();
        let mut bytes = umschlag_bytes(&env);
        bytes[0] ^= 0x01;
        let env_m = EncryptedEnvelope {
            ciphertext_base64: STANDARD.encode(&bytes),
            ..env
        };
        assert!(matches!(
            cipher.decrypt::<Value>(&env_m),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn nonces_paarweise_verschieden() {
        let cipher = bereiter_cipher();
        let mut gesehen = HashSet::new();
        for i in 0..10_000u32 {
            let env = cipher.encrypt(&i).unwrap();
            let nonce = Nonce::aus_slice(&umschlag_bytes(&env)).unwrap();
            assert!(gesehen.insert(nonce), "Nonce bei Aufruf {i} wiederverwendet");
        }
    }

    #[test]
    fn nonces_eindeutig_bei_parallelen_aufrufen() {
        let cipher = Arc::new(bereiter_cipher());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cipher = Arc::clone(&cipher);
                std::thread::spawn(move || {
                    (0..1_000)
                        .map(|i| {
                            let env = cipher.encrypt(&i).unwrap();
                            Nonce::aus_slice(&umschlag_bytes(&env)).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut gesehen = HashSet::new();
        for h in handles {
            for nonce in h.join().unwrap() {
                assert!(gesehen.insert(nonce));
            }
        }
        assert_eq!(gesehen.len(), 4_000);
    }

    #[test]
    fn falscher_schluessel_schlaegt_fehl() {
        let k1 = bereiter_cipher();
        let k2 = bereiter_cipher();
        let env = k1.encrypt(&json!({ "geheim": true })).unwrap();
        assert!(matches!(
            k2.decrypt::<Value>(&env),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn neu_initialisieren_bricht_alte_umschlaege() {
        let cipher = bereiter_cipher();
        let env = cipher.encrypt(&json!("vorher")).unwrap();
        cipher.initialize().unwrap();
        assert!(matches!(
            cipher.decrypt::<Value>(&env),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn ungueltiges_base64() {
        let cipher = bereiter_cipher();
        let env = EncryptedEnvelope {
            ciphertext_base64: "kein base64 !!!".into(),
            algorithm_id: "AES-256-GCM".into(),
            created_at_millis: 0,
        };
        assert!(matches!(
            cipher.decrypt::<Value>(&env),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn zu_kurzer_umschlag() {
        let cipher = bereiter_cipher();
        let env = EncryptedEnvelope {
            ciphertext_base64: STANDARD.encode([0u8; NONCE_LEN + TAG_LEN - 1]),
            algorithm_id: "AES-256-GCM".into(),
            created_at_millis: 0,
        };
        assert!(matches!(
            cipher.decrypt::<Value>(&env),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn algorithmus_passt_nicht() {
        let cipher = bereiter_cipher();
        let mut env = cipher.encrypt(&json!(1)).unwrap();
        env.algorithm_id = "CHACHA20-POLY1305".into();
        assert!(matches!(
            cipher.decrypt::<Value>(&env),
            Err(CryptoError::MalformedEnvelope(_))
        ));

        env.algorithm_id = "AES-CBC".into();
        assert!(matches!(
            cipher.decrypt::<Value>(&env),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn falscher_zieltyp_ist_serialisierungsfehler() {
        let cipher = bereiter_cipher();
        let env = cipher.encrypt(&json!("kein u32")).unwrap();
        assert!(matches!(
            cipher.decrypt::<u32>(&env),
            Err(CryptoError::Serialization(_))
        ));
    }

    #[test]
    fn export_key_laenge() {
        let cipher = bereiter_cipher();
        let exportiert = cipher.export_key().unwrap();
        assert_eq!(STANDARD.decode(exportiert).unwrap().len(), KEY_LEN);
    }

    #[test]
    fn metadata_werte() {
        let meta = KeyedCipher::default().metadata();
        assert_eq!(meta.algorithm, CipherAlgorithm::Aes256Gcm);
        assert_eq!(meta.key_bits, 256);
        assert_eq!(meta.nonce_bits, 96);
        assert_eq!(meta.tag_bits, 128);
    }

    #[test]
    fn debug_zeigt_keinen_schluessel() {
        let cipher = bereiter_cipher();
        let dbg = format!("{cipher:?}");
        assert!(dbg.contains("initialisiert: true"));
        assert!(!dbg.contains(&cipher.export_key().unwrap()));
    }
}
