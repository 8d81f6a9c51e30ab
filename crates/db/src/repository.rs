//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt die Geschaeftslogik von der konkreten
//! Datenbank-Implementierung. Jede Operation ist fuer sich atomar; es gibt
//! keine Transaktionen ueber mehrere Datensaetze.

use async_trait::async_trait;
use tresor_core::{ChatId, InviteId, MessageId, UserId};

use crate::error::DbError;
use crate::models::{
    ChatRecord, EinladungRecord, EnvelopeRecord, NachrichtRecord, RotationJobRecord,
    SchluesselRecord, SessionRecord,
};

pub type DbResult<T> = Result<T, DbError>;

/// Repository fuer Chats und Mitgliedschaften
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Legt einen Chat an; doppelte ID ergibt [`DbError::Eindeutigkeit`]
    async fn create_chat(&self, chat: ChatRecord) -> DbResult<()>;

    async fn get_chat(&self, chat_id: ChatId) -> DbResult<Option<ChatRecord>>;

    /// Setzt die aktuelle Schluessel-Version
    async fn set_key_version(&self, chat_id: ChatId, key_version: u64) -> DbResult<()>;

    /// Fuegt ein Mitglied hinzu; false wenn es bereits Mitglied war
    async fn add_member(&self, chat_id: ChatId, user_id: UserId) -> DbResult<bool>;

    /// Entfernt ein Mitglied; false wenn es kein Mitglied war
    async fn remove_member(&self, chat_id: ChatId, user_id: UserId) -> DbResult<bool>;

    async fn list_members(&self, chat_id: ChatId) -> DbResult<Vec<UserId>>;

    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> DbResult<bool>;
}

/// Repository fuer die RSA-Umschlaege pro (Chat, Mitglied)
#[async_trait]
pub trait EnvelopeRepository: Send + Sync {
    async fn get_chat_member_envelope(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> DbResult<Option<EnvelopeRecord>>;

    /// Schreibt oder ersetzt den Umschlag eines Mitglieds
    async fn put_chat_member_envelope(&self, envelope: EnvelopeRecord) -> DbResult<()>;

    async fn delete_chat_member_envelope(&self, chat_id: ChatId, user_id: UserId)
        -> DbResult<bool>;

    async fn list_envelopes(&self, chat_id: ChatId) -> DbResult<Vec<EnvelopeRecord>>;
}

/// Repository fuer verschluesselte Nachrichten
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: NachrichtRecord) -> DbResult<()>;

    /// Alle Nachrichten eines Chats, sortiert nach Zeitstempel und ID
    async fn get_messages_for_chat(&self, chat_id: ChatId) -> DbResult<Vec<NachrichtRecord>>;

    /// Ersetzt das Chiffrat einer Nachricht an Ort und Stelle
    async fn update_message_ciphertext(
        &self,
        message_id: MessageId,
        ciphertext: Vec<u8>,
        key_version: u64,
    ) -> DbResult<()>;
}

/// Repository fuer offene Einladungen
#[async_trait]
pub trait InviteRepository: Send + Sync {
    async fn create_invite(&self, invite: EinladungRecord) -> DbResult<()>;

    async fn get_invite(&self, invite_id: InviteId) -> DbResult<Option<EinladungRecord>>;

    async fn delete_invite(&self, invite_id: InviteId) -> DbResult<bool>;
}

/// Schluessel-Verzeichnis (Server-Verwahrung der RSA-Schluesselpaare)
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    async fn put_user_keys(&self, user_id: UserId, keys: SchluesselRecord) -> DbResult<()>;

    /// `(e, N)` als Big-Endian Bytes
    async fn get_public_key(&self, user_id: UserId) -> DbResult<(Vec<u8>, Vec<u8>)>;

    /// `(d, N)` als Big-Endian Bytes
    async fn get_private_key(&self, user_id: UserId) -> DbResult<(Vec<u8>, Vec<u8>)>;

    /// Schluesselpaar des Servers fuer das Rotations-Journal
    async fn put_custody_keys(&self, keys: SchluesselRecord) -> DbResult<()>;

    async fn get_custody_keys(&self) -> DbResult<Option<SchluesselRecord>>;
}

/// Repository fuer das Rotations-Journal (hoechstens ein Eintrag pro Chat)
#[async_trait]
pub trait RotationJobRepository: Send + Sync {
    async fn put_job(&self, job: RotationJobRecord) -> DbResult<()>;

    async fn get_job(&self, chat_id: ChatId) -> DbResult<Option<RotationJobRecord>>;

    async fn delete_job(&self, chat_id: ChatId) -> DbResult<bool>;
}

/// Repository fuer Sitzungen
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn put_session(&self, session: SessionRecord) -> DbResult<()>;

    async fn get_session(&self, user_id: UserId) -> DbResult<Option<SessionRecord>>;

    async fn delete_session(&self, user_id: UserId) -> DbResult<bool>;
}

/// Alle Repositories, die der Chat-Dienst benoetigt
pub trait ChatStore:
    ChatRepository
    + EnvelopeRepository
    + MessageRepository
    + InviteRepository
    + KeyDirectory
    + RotationJobRepository
{
}

impl<T> ChatStore for T where
    T: ChatRepository
        + EnvelopeRepository
        + MessageRepository
        + InviteRepository
        + KeyDirectory
        + RotationJobRepository
{
}
