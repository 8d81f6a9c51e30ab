//! Oeffentliche Typen fuer den Chat-Service

use serde::{Deserialize, Serialize};
use tresor_core::{ChatId, InviteId, MessageId, UserId};
use tresor_crypto::{CryptoResult, RsaKeyPair, RsaPrivateKey, RsaPublicKey};
use tresor_db::{ChatRecord, EinladungRecord, SchluesselRecord};

/// Erste Schluessel-Version eines Chats
pub const ERSTE_VERSION: u64 = 1;

/// Maximale Klartextgroesse einer Nachricht in Bytes
pub const MAX_NACHRICHT_BYTES: usize = 64 * 1024;

/// Maximale Laenge eines Chat-Namens in Zeichen
pub const MAX_NAME_LAENGE: usize = 128;

/// Ergebnis beim Uebernehmen eines Einladungs-Umschlags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "art")]
pub enum GrantErgebnis {
    /// Umschlag passte zur aktuellen Version und wurde unveraendert abgelegt
    Uebernommen { version: u64 },
    /// Umschlag war veraltet und wurde mit dem aktuellen Schluessel neu verpackt
    NeuVerpackt { von_version: u64, auf_version: u64 },
}

impl GrantErgebnis {
    /// Schluessel-Version, die das Mitglied jetzt haelt
    pub fn version(&self) -> u64 {
        match self {
            Self::Uebernommen { version } => *version,
            Self::NeuVerpackt { auf_version, .. } => *auf_version,
        }
    }
}

/// Chat-Uebersicht (Domain-Typ, nicht DB-Record)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: ChatId,
    pub name: String,
    pub creator_id: UserId,
    pub key_version: u64,
    pub created_at_millis: i64,
}

impl From<ChatRecord> for ChatInfo {
    fn from(r: ChatRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            creator_id: r.creator_id,
            key_version: r.key_version,
            created_at_millis: r.created_at_millis,
        }
    }
}

/// Quittung fuer eine gespeicherte Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GesendeteNachricht {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub timestamp_millis: i64,
    pub key_version: u64,
}

/// Entschluesselte Nachricht aus der History
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntschluesselteNachricht {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub timestamp_millis: i64,
    pub key_version: u64,
    pub inhalt: Vec<u8>,
}

/// Offene Einladung ohne Schluesselmaterial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Einladung {
    pub id: InviteId,
    pub chat_id: ChatId,
    pub inviter_id: UserId,
    pub invitee_id: UserId,
    pub key_version: u64,
}

impl From<&EinladungRecord> for Einladung {
    fn from(r: &EinladungRecord) -> Self {
        Self {
            id: r.id,
            chat_id: r.chat_id,
            inviter_id: r.inviter_id,
            invitee_id: r.invitee_id,
            key_version: r.key_version,
        }
    }
}

/// Legt ein Schluesselpaar fuer die Server-Verwahrung ab
pub fn schluessel_record(paar: &RsaKeyPair) -> SchluesselRecord {
    let (public_e, modulus) = paar.public.to_parts();
    let (d, _) = paar.private.to_parts();
    SchluesselRecord {
        public_e,
        modulus,
        private_d: d.as_bytes().to_vec(),
    }
}

/// Gegenstueck zu [`schluessel_record`]
pub fn schluesselpaar(record: &SchluesselRecord) -> CryptoResult<RsaKeyPair> {
    Ok(RsaKeyPair {
        public: RsaPublicKey::from_parts(&record.public_e, &record.modulus)?,
        private: RsaPrivateKey::from_parts(&record.private_d, &record.modulus)?,
    })
}
