//! Fehlertypen fuer das Kryptografie-Subsystem
//!
//! Alle Varianten sind harte Fehler: sie werden weder verschluckt noch
//! wiederholt noch zu einer Warnung herabgestuft.

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// AEAD-Tag stimmt nicht (Manipulation, falscher Schluessel oder falsche AAD)
    #[error("Authentifizierung fehlgeschlagen")]
    AuthenticationFailure,

    #[error("Ungueltiges PKCS#7-Padding")]
    InvalidPadding,

    /// Gepolsterter Schluessel ist nicht kleiner als der RSA-Modulus
    #[error("Schluessel zu gross fuer den RSA-Modulus")]
    KeyTooLarge,

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Schluessel-Generierung fehlgeschlagen: {0}")]
    SchluesselGenerierung(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
