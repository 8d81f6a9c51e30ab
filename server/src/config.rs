//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::time::Duration;

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tresor_auth::RefreshPolicy;
use tresor_crypto::keywrap::{DEFAULT_PRIME_BITS, MIN_PRIME_BITS};

/// Mindestlaenge des Token-Secrets in Bytes
pub const MIN_SECRET_BYTES: usize = 32;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Session-Tokens
    pub token: TokenEinstellungen,
    /// Token-Erneuerung
    pub sitzung: SitzungEinstellungen,
    /// RSA-Schluesselerzeugung
    pub krypto: KryptoEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Tresor Server".into(),
        }
    }
}

/// Session-Token-Einstellungen
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenEinstellungen {
    /// HMAC-Secret als Base64 (leer = ephemeres Secret pro Prozess)
    pub secret: Option<String>,
    /// Lebensdauer eines Tokens in Sekunden
    pub lebensdauer_sekunden: u64,
    /// Sperrliste fuer getrennte Tokens aktivieren
    pub sperrliste: bool,
}

impl Default for TokenEinstellungen {
    fn default() -> Self {
        Self {
            secret: None,
            lebensdauer_sekunden: 900,
            sperrliste: false,
        }
    }
}

impl std::fmt::Debug for TokenEinstellungen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEinstellungen")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("lebensdauer_sekunden", &self.lebensdauer_sekunden)
            .field("sperrliste", &self.sperrliste)
            .finish()
    }
}

/// Einstellungen fuer die periodische Token-Erneuerung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungEinstellungen {
    /// Abstand zwischen zwei Erneuerungen in Sekunden
    pub refresh_intervall_sekunden: u64,
    /// Versuche pro Erneuerung bevor eine erneute Anmeldung noetig wird
    pub max_versuche: u32,
    /// Wartezeit nach dem ersten Fehlversuch in Millisekunden
    pub basis_backoff_ms: u64,
}

impl Default for SitzungEinstellungen {
    fn default() -> Self {
        Self {
            refresh_intervall_sekunden: 600,
            max_versuche: 3,
            basis_backoff_ms: 500,
        }
    }
}

/// Krypto-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KryptoEinstellungen {
    /// Groesse jeder der beiden RSA-Primzahlen in Bit
    pub rsa_primzahl_bits: usize,
}

impl Default for KryptoEinstellungen {
    fn default() -> Self {
        Self {
            rsa_primzahl_bits: DEFAULT_PRIME_BITS,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level bzw. Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Wertebereiche und Abhaengigkeiten zwischen den Abschnitten
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.token.lebensdauer_sekunden == 0 {
            bail!("token.lebensdauer_sekunden muss groesser als 0 sein");
        }
        if self.sitzung.refresh_intervall_sekunden == 0
            || self.sitzung.refresh_intervall_sekunden >= self.token.lebensdauer_sekunden
        {
            bail!(
                "sitzung.refresh_intervall_sekunden muss zwischen 1 und {} liegen",
                self.token.lebensdauer_sekunden - 1
            );
        }
        if self.sitzung.max_versuche == 0 {
            bail!("sitzung.max_versuche muss mindestens 1 sein");
        }
        if self.krypto.rsa_primzahl_bits < MIN_PRIME_BITS {
            bail!("krypto.rsa_primzahl_bits muss mindestens {MIN_PRIME_BITS} sein");
        }
        Ok(())
    }

    /// Token-Secret aus der Konfiguration oder ein ephemeres Secret
    ///
    /// Ohne konfiguriertes Secret werden alle Tokens beim Neustart ungueltig.
    pub fn token_secret(&self) -> anyhow::Result<Vec<u8>> {
        let Some(kodiert) = self.token.secret.as_deref() else {
            tracing::warn!(
                "Kein token.secret konfiguriert, erzeuge ephemeres Secret (Tokens ueberleben keinen Neustart)"
            );
            let mut secret = vec![0u8; MIN_SECRET_BYTES];
            OsRng.fill_bytes(&mut secret);
            return Ok(secret);
        };

        let secret = STANDARD
            .decode(kodiert.trim())
            .context("token.secret ist kein gueltiges Base64")?;
        if secret.len() < MIN_SECRET_BYTES {
            bail!(
                "token.secret zu kurz: {} Bytes (Minimum: {MIN_SECRET_BYTES})",
                secret.len()
            );
        }
        Ok(secret)
    }

    pub fn token_lebensdauer_millis(&self) -> i64 {
        i64::try_from(self.token.lebensdauer_sekunden.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            intervall: Duration::from_secs(self.sitzung.refresh_intervall_sekunden),
            max_versuche: self.sitzung.max_versuche,
            basis_backoff: Duration::from_millis(self.sitzung.basis_backoff_ms),
        }
    }
}
