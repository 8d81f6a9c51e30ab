//! Fehlerklassen an der Service-Grenze
//!
//! Jeder fachliche Fehler der inneren Crates wird an der Grenze in genau
//! eine von zwei Klassen ueberfuehrt: eine erwartete Ablehnung (`Rejected`)
//! oder eine unerwartete Stoerung (`Fault`). Aufrufer koennen damit
//! unterscheiden, ob sie dem Benutzer eine Ablehnung melden oder einen
//! Betreiber alarmieren muessen.

use thiserror::Error;

/// Result-Alias fuer Operationen an der Service-Grenze
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Grund einer erwarteten fachlichen Ablehnung
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ablehnung {
    /// Token fehlt, ist manipuliert oder abgelaufen. Absichtlich ohne Detail.
    #[error("nicht authentifiziert")]
    Unauthenticated,

    #[error("kein Mitglied: {0}")]
    MembershipViolation(String),

    #[error("nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    /// Eine abgebrochene Schluesselrotation blockiert den Chat
    #[error("Schluesselrotation ausstehend: {0}")]
    RotationAusstehend(String),

    #[error("erneute Anmeldung erforderlich")]
    ReauthentifizierungErforderlich,
}

/// Getaggter Fehler an der Service-Grenze
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Abgelehnt: {0}")]
    Rejected(Ablehnung),

    #[error("Stoerung: {0}")]
    Fault(String),
}

impl ServiceError {
    /// Erstellt eine Stoerung aus einer beliebigen Nachricht
    pub fn fault(msg: impl Into<String>) -> Self {
        Self::Fault(msg.into())
    }

    /// Gibt true zurueck wenn es sich um eine erwartete Ablehnung handelt
    pub fn ist_ablehnung(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<Ablehnung> for ServiceError {
    fn from(grund: Ablehnung) -> Self {
        Self::Rejected(grund)
    }
}
