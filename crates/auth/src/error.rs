//! Fehlertypen fuer den Auth-Service

use thiserror::Error;
use tresor_core::{Ablehnung, ServiceError};

/// Alle moeglichen Fehler im Auth-Service
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Token ---
    /// Bewusst ohne Detail, welche Pruefung fehlschlug
    #[error("nicht authentifiziert")]
    Unauthenticated,

    // --- Session ---
    #[error("Keine aktive Session fuer diesen Benutzer")]
    SessionUnbekannt,

    #[error("Token-Erneuerung nach {versuche} Versuchen aufgegeben, erneute Anmeldung erforderlich")]
    ReauthentifizierungErforderlich { versuche: u32 },

    // --- Datenbank ---
    #[error("Datenbankfehler: {0}")]
    Datenbank(#[from] tresor_db::DbError),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Ordnet den Fehler einer der beiden Klassen an der Service-Grenze zu
    pub fn klassifizieren(self) -> ServiceError {
        match self {
            Self::Unauthenticated | Self::SessionUnbekannt => {
                ServiceError::Rejected(Ablehnung::Unauthenticated)
            }
            Self::ReauthentifizierungErforderlich { .. } => {
                ServiceError::Rejected(Ablehnung::ReauthentifizierungErforderlich)
            }
            Self::Datenbank(e) => ServiceError::fault(e.to_string()),
            Self::Intern(msg) => ServiceError::Fault(msg),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        e.klassifizieren()
    }
}

/// Result-Alias fuer den Auth-Service
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_fehler_ist_ablehnung() {
        let e: ServiceError = AuthError::Unauthenticated.into();
        assert!(matches!(e, ServiceError::Rejected(Ablehnung::Unauthenticated)));
    }

    #[test]
    fn datenbank_fehler_ist_stoerung() {
        let e: ServiceError = AuthError::Datenbank(tresor_db::DbError::intern("kaputt")).into();
        assert!(!e.ist_ablehnung());
    }
}
