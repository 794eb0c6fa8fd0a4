//! # haven-observability
//!
//! Observability-Crate fuer Haven:
//! - Structured Logging via tracing-subscriber (Text oder JSON)
//! - Umgebungs-Overrides `HAVEN_LOG_LEVEL` und `HAVEN_LOG_FORMAT`

pub mod logging;

pub use logging::{
    log_filter_gueltig, log_format_gueltig, logging_initialisieren, LogFormat, LoggingError,
    ENV_LOG_FORMAT, ENV_LOG_LEVEL,
};
