//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `HAVEN_LOG_LEVEL`: Log-Level oder Filter-Direktive (z.B. `info,haven_peer=debug`)
//! - `HAVEN_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Umgebungsvariablen haben Vorrang vor den Werten aus der Konfiguration.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "HAVEN_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "HAVEN_LOG_FORMAT";

/// Fehler beim Einrichten des Loggings
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Ungueltiger Log-Filter '{0}'")]
    InvalidLevel(String),

    #[error("Ungueltiges Log-Format '{0}' (erlaubt: text, json)")]
    InvalidFormat(String),

    #[error("Logging bereits initialisiert: {0}")]
    AlreadyInitialized(String),
}

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn aus_str(format: &str) -> Result<Self, LoggingError> {
        match format {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            andere => Err(LoggingError::InvalidFormat(andere.to_string())),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `HAVEN_LOG_LEVEL` und `HAVEN_LOG_FORMAT` ueberschreiben die uebergebenen
/// Werte. Ein zweiter Aufruf im selben Prozess liefert `AlreadyInitialized`.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<(), LoggingError> {
    let level = wert_aufloesen(level, std::env::var(ENV_LOG_LEVEL).ok());
    let format = wert_aufloesen(format, std::env::var(ENV_LOG_FORMAT).ok());

    if !log_filter_gueltig(&level) {
        return Err(LoggingError::InvalidLevel(level));
    }
    let filter =
        EnvFilter::try_new(&level).map_err(|_| LoggingError::InvalidLevel(level.clone()))?;

    let ergebnis = match LogFormat::aus_str(&format)? {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    ergebnis.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Nicht-leerer Umgebungswert hat Vorrang vor dem konfigurierten Wert
fn wert_aufloesen(konfiguriert: &str, env: Option<String>) -> String {
    env.map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| konfiguriert.to_string())
}

/// Validiert einen Log-Level oder eine Filter-Direktive wie `info,haven_peer=debug`.
///
/// Jede Direktive ist entweder ein Level oder `ziel=level`.
pub fn log_filter_gueltig(filter: &str) -> bool {
    let filter = filter.trim();
    !filter.is_empty()
        && filter.split(',').all(|direktive| match direktive.trim().split_once('=') {
            Some((ziel, level)) => !ziel.trim().is_empty() && level_gueltig(level.trim()),
            None => level_gueltig(direktive.trim()),
        })
        && EnvFilter::try_new(filter).is_ok()
}

fn level_gueltig(level: &str) -> bool {
    matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    LogFormat::aus_str(format).is_ok()
}
