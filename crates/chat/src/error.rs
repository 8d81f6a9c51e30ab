//! Fehlertypen fuer das Chat-Crate

use thiserror::Error;
use tresor_core::{Ablehnung, ChatId, InviteId, ServiceError};
use tresor_crypto::CryptoError;
use tresor_db::DbError;

/// Chat-Fehlertypen
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Keine Berechtigung: {0}")]
    MembershipViolation(String),

    /// Fataler Abbruch; das Journal bleibt fuer die manuelle Fortsetzung stehen
    #[error("Schluesselrotation von Chat {chat_id} auf Version {ziel_version} abgebrochen: {grund}")]
    RotationAborted {
        chat_id: ChatId,
        ziel_version: u64,
        grund: String,
    },

    #[error("Chat {0} hat eine ausstehende Schluesselrotation")]
    RotationAusstehend(ChatId),

    #[error("Kein Gruppen-Schluessel verfuegbar: {0}")]
    KeinSchluessel(String),

    #[error("Chat {0} hat bereits einen Gruppen-Schluessel")]
    SchluesselExistiert(ChatId),

    #[error("Versionskonflikt: erwartet {erwartet}, gefunden {gefunden}")]
    VersionKonflikt { erwartet: u64, gefunden: u64 },

    #[error("Chat nicht gefunden: {0}")]
    ChatNichtGefunden(ChatId),

    #[error("Einladung nicht gefunden: {0}")]
    EinladungNichtGefunden(InviteId),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Datenbank-Fehler: {0}")]
    Datenbank(#[from] DbError),
}

impl ChatError {
    pub fn ist_rotation_abgebrochen(&self) -> bool {
        matches!(self, Self::RotationAborted { .. })
    }

    /// Ordnet den Fehler einer der beiden Klassen an der Service-Grenze zu
    ///
    /// Krypto-Fehler und Versionskonflikte deuten auf beschaedigte oder
    /// inkonsistente Daten und sind daher immer Stoerungen.
    pub fn klassifizieren(self) -> ServiceError {
        match self {
            Self::MembershipViolation(msg) => Ablehnung::MembershipViolation(msg).into(),
            Self::RotationAusstehend(chat_id) => {
                Ablehnung::RotationAusstehend(chat_id.to_string()).into()
            }
            Self::SchluesselExistiert(chat_id) => {
                Ablehnung::UngueltigeEingabe(format!("Chat {chat_id} hat bereits einen Schluessel"))
                    .into()
            }
            Self::ChatNichtGefunden(chat_id) => {
                Ablehnung::NichtGefunden(format!("Chat {chat_id}")).into()
            }
            Self::EinladungNichtGefunden(invite_id) => {
                Ablehnung::NichtGefunden(format!("Einladung {invite_id}")).into()
            }
            Self::UngueltigeEingabe(msg) => Ablehnung::UngueltigeEingabe(msg).into(),
            Self::Datenbank(DbError::NichtGefunden(msg)) => Ablehnung::NichtGefunden(msg).into(),
            e @ (Self::Crypto(_)
            | Self::RotationAborted { .. }
            | Self::KeinSchluessel(_)
            | Self::VersionKonflikt { .. }
            | Self::Datenbank(_)) => ServiceError::fault(e.to_string()),
        }
    }
}

impl From<ChatError> for ServiceError {
    fn from(e: ChatError) -> Self {
        e.klassifizieren()
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
