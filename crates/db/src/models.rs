//! Datenbankmodelle fuer Tresor
//!
//! Diese Typen repraesentieren Datensaetze aus der Datenbank. Schluessel-
//! material wird nur als undurchsichtige Bytes gespeichert; die Deutung
//! liegt bei den Krypto- und Chat-Crates.

use serde::{Deserialize, Serialize};
use tresor_core::{ChatId, InviteId, MessageId, UserId};

/// Schluessel-Version eines Chats ohne Gruppen-Schluessel
pub const NO_KEY: u64 = 0;

// ---------------------------------------------------------------------------
// Chats
// ---------------------------------------------------------------------------

/// Chat-Datensatz aus der Datenbank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ChatId,
    pub name: String,
    pub creator_id: UserId,
    /// Aktuelle Schluessel-Version; [`NO_KEY`] solange kein Schluessel existiert
    pub key_version: u64,
    pub created_at_millis: i64,
}

impl ChatRecord {
    pub fn hat_schluessel(&self) -> bool {
        self.key_version != NO_KEY
    }
}

// ---------------------------------------------------------------------------
// Umschlaege
// ---------------------------------------------------------------------------

/// RSA-Umschlag mit dem Gruppen-Schluessel fuer ein Mitglied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub key_version: u64,
    pub ciphertext: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Nachrichten
// ---------------------------------------------------------------------------

/// Verschluesselte Nachricht (`IV || Ciphertext || Tag`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NachrichtRecord {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub timestamp_millis: i64,
    pub key_version: u64,
    pub ciphertext: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Einladungen
// ---------------------------------------------------------------------------

/// Offene Einladung inklusive des bei Erstellung verpackten Umschlags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EinladungRecord {
    pub id: InviteId,
    pub chat_id: ChatId,
    pub inviter_id: UserId,
    pub invitee_id: UserId,
    pub key_version: u64,
    pub envelope_ciphertext: Vec<u8>,
    pub created_at_millis: i64,
}

// ---------------------------------------------------------------------------
// Rotations-Journal
// ---------------------------------------------------------------------------

/// Laufende oder abgebrochene Schluessel-Rotation eines Chats
///
/// Beide Schluessel liegen mit dem Verwahrungs-Schluessel des Servers
/// verpackt vor, damit eine unterbrochene Rotation fortgesetzt werden kann.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationJobRecord {
    pub chat_id: ChatId,
    pub from_version: u64,
    pub target_version: u64,
    pub old_key_wrapped: Vec<u8>,
    pub new_key_wrapped: Vec<u8>,
    pub started_at_millis: i64,
}

// ---------------------------------------------------------------------------
// Sitzungen
// ---------------------------------------------------------------------------

/// Serverseitige Sitzungs-Buchfuehrung eines Benutzers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub token: String,
    pub issued_at_millis: i64,
    pub expires_at_millis: i64,
}

// ---------------------------------------------------------------------------
// Schluessel-Verzeichnis
// ---------------------------------------------------------------------------

/// RSA-Schluesselpaar in Server-Verwahrung (Big-Endian Bytes)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchluesselRecord {
    pub public_e: Vec<u8>,
    pub modulus: Vec<u8>,
    pub private_d: Vec<u8>,
}

impl std::fmt::Debug for SchluesselRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchluesselRecord")
            .field("modulus_len", &self.modulus.len())
            .field("private_d", &"[REDACTED]")
            .finish()
    }
}
