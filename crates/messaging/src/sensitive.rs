//! Heuristik fuer sensible Inhalte (Gesundheits- und Personendaten)
//!
//! Rein informativ: ein Treffer erzeugt einen Hinweis, die Nachricht wird
//! trotzdem gesendet. Geprueft werden alle String-Werte eines Payloads.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MessagingError, MessagingResult};

/// Art eines erkannten Musters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveKind {
    /// Nationale Kennnummer im Format `123-45-6789`
    NationalId,
    /// Telefonnummer im Format `555-123-4567`
    Phone,
    Email,
    /// Explizites Schluesselwort (z.B. "date of birth")
    Keyword,
}

impl SensitiveKind {
    pub fn als_str(self) -> &'static str {
        match self {
            Self::NationalId => "national_id",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Keyword => "keyword",
        }
    }
}

impl std::fmt::Display for SensitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Hinweis an den Aufrufer, blockiert das Senden nicht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveAdvisory {
    /// Alle erkannten Arten, sortiert und ohne Duplikate
    pub kinds: Vec<SensitiveKind>,
}

impl SensitiveAdvisory {
    pub fn enthaelt(&self, kind: SensitiveKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Anzeigetext fuer die Oberflaeche
    pub fn meldung(&self) -> String {
        let arten: Vec<&str> = self.kinds.iter().map(|k| k.als_str()).collect();
        format!(
            "Nachricht enthaelt moeglicherweise sensible Daten ({}). Bitte Datenschutzvorgaben beachten.",
            arten.join(", ")
        )
    }
}

fn national_id() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("gueltiges Muster"))
}

fn telefon() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{3}-\d{4}\b").expect("gueltiges Muster"))
}

fn email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("gueltiges Muster")
    })
}

fn schluesselwoerter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(ssn|social security|dob|date of birth)\b").expect("gueltiges Muster")
    })
}

/// Erkennt Muster sensibler Daten in Klartext-Payloads
#[derive(Debug, Clone, Default)]
pub struct SensitiveContentDetector {
    /// Zusaetzliche Schluesselwoerter aus der Konfiguration
    zusaetzlich: Option<Regex>,
}

impl SensitiveContentDetector {
    /// Detektor mit den eingebauten Mustern
    pub fn neu() -> Self {
        Self::default()
    }

    /// Detektor mit zusaetzlichen Schluesselwoertern (Gross-/Kleinschreibung egal)
    pub fn mit_schluesselwoertern<S: AsRef<str>>(woerter: &[S]) -> MessagingResult<Self> {
        let teile: Vec<String> = woerter
            .iter()
            .map(|w| w.as_ref().trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();
        if teile.is_empty() {
            return Ok(Self::neu());
        }

        let muster = format!(r"(?i)\b(?:{})\b", teile.join("|"));
        let re = Regex::new(&muster)
            .map_err(|e| MessagingError::InvalidInput(format!("Schluesselwoerter: {e}")))?;
        Ok(Self {
            zusaetzlich: Some(re),
        })
    }

    /// Prueft einen einzelnen Text
    pub fn text_pruefen(&self, text: &str) -> Vec<SensitiveKind> {
        let mut arten = Vec::new();
        if national_id().is_match(text) {
            arten.push(SensitiveKind::NationalId);
        }
        if telefon().is_match(text) {
            arten.push(SensitiveKind::Phone);
        }
        if email().is_match(text) {
            arten.push(SensitiveKind::Email);
        }
        let schluesselwort = schluesselwoerter().is_match(text)
            || self.zusaetzlich.as_ref().is_some_and(|re| re.is_match(text));
        if schluesselwort {
            arten.push(SensitiveKind::Keyword);
        }
        arten
    }

    /// Prueft alle String-Werte eines serialisierbaren Payloads
    pub fn pruefen<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> MessagingResult<Option<SensitiveAdvisory>> {
        let wert = serde_json::to_value(payload)
            .map_err(|e| MessagingError::Serialization(e.to_string()))?;

        let mut arten = Vec::new();
        self.wert_pruefen(&wert, &mut arten);
        arten.sort();
        arten.dedup();

        Ok((!arten.is_empty()).then_some(SensitiveAdvisory { kinds: arten }))
    }

    fn wert_pruefen(&self, wert: &Value, arten: &mut Vec<SensitiveKind>) {
        match wert {
            Value::String(s) => arten.extend(self.text_pruefen(s)),
            Value::Array(liste) => liste.iter().for_each(|w| self.wert_pruefen(w, arten)),
            Value::Object(felder) => felder.values().for_each(|w| self.wert_pruefen(w, arten)),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
}
