//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `TRESOR_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `tresor_chat=debug`)
//! - `TRESOR_LOG_FORMAT`: Format (`text`/`json`)
//!
//! Umgebungsvariablen haben Vorrang vor den Werten aus der Konfiguration.

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "TRESOR_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TRESOR_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Unbekannte Werte fallen auf `Text` zurueck
    pub fn parsen(wert: &str) -> Self {
        match wert.trim() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Initialisiert das Logging-System.
///
/// Liest `TRESOR_LOG_LEVEL` und `TRESOR_LOG_FORMAT` aus der Umgebung und
/// faellt sonst auf `level` / `format` zurueck. Ein ungueltiger Filter wird
/// durch `info` ersetzt. Ein zweiter Aufruf ist wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = filter_aufloesen(std::env::var(ENV_LOG_LEVEL).ok(), level);
    let format = LogFormat::parsen(
        &std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string()),
    );

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_ok() {
        tracing::debug!(?format, "Logging initialisiert");
    }
}

fn filter_aufloesen(aus_env: Option<String>, level: &str) -> EnvFilter {
    aus_env
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
