//! In-Memory-Implementierung aller Repositories
//!
//! Haelt alle Tabellen hinter einem `parking_lot::RwLock`. Jede Operation
//! nimmt die Sperre genau einmal und ist damit pro Datensatz atomar, wie es
//! die Repository-Vertraege verlangen.
//!
//! Fuer Tests laesst sich an festen Stellen deterministisch ein Fehler
//! injizieren (siehe [`FehlerInjektion`]).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tresor_core::{ChatId, InviteId, MessageId, UserId};

use crate::error::DbError;
use crate::models::{
    ChatRecord, EinladungRecord, EnvelopeRecord, NachrichtRecord, RotationJobRecord,
    SchluesselRecord, SessionRecord,
};
use crate::repository::{
    ChatRepository, DbResult, EnvelopeRepository, InviteRepository, KeyDirectory,
    MessageRepository, RotationJobRepository, SessionRepository,
};

/// Stelle, an der ein Fehler injiziert werden kann
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fehlerpunkt {
    UmschlagSchreiben,
    NachrichtEinfuegen,
    NachrichtAktualisieren,
    JobSchreiben,
    SitzungSchreiben,
    SitzungLoeschen,
}

/// Deterministische Fehler-Injektion
///
/// Laesst zuerst `erfolge_vorher` Aufrufe durch und schlaegt danach fehl,
/// entweder dauerhaft oder fuer eine feste Anzahl an Aufrufen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FehlerInjektion {
    erfolge_vorher: u32,
    fehlschlaege: Option<u32>,
}

impl FehlerInjektion {
    /// Dauerhafter Fehler nach `erfolge` erfolgreichen Aufrufen
    pub fn nach(erfolge: u32) -> Self {
        Self {
            erfolge_vorher: erfolge,
            fehlschlaege: None,
        }
    }

    /// Dauerhafter Fehler ab dem naechsten Aufruf
    pub fn sofort() -> Self {
        Self::nach(0)
    }

    /// Begrenzt die Anzahl der Fehlschlaege; danach laeuft alles wieder
    pub fn mal(self, anzahl: u32) -> Self {
        Self {
            fehlschlaege: Some(anzahl),
            ..self
        }
    }
}

#[derive(Debug, Default)]
struct Tabellen {
    chats: HashMap<ChatId, ChatRecord>,
    mitglieder: HashMap<ChatId, BTreeSet<UserId>>,
    umschlaege: HashMap<(ChatId, UserId), EnvelopeRecord>,
    nachrichten: HashMap<MessageId, NachrichtRecord>,
    einladungen: HashMap<InviteId, EinladungRecord>,
    schluessel: HashMap<UserId, SchluesselRecord>,
    verwahrung: Option<SchluesselRecord>,
    jobs: HashMap<ChatId, RotationJobRecord>,
    sitzungen: HashMap<UserId, SessionRecord>,
}

/// In-Memory-Datenbank
#[derive(Debug, Default)]
pub struct MemoryDb {
    tabellen: RwLock<Tabellen>,
    fehler: Mutex<HashMap<Fehlerpunkt, FehlerInjektion>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Erstellt eine geteilte Instanz
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Aktiviert eine Fehler-Injektion (ersetzt eine vorhandene)
    pub fn fehler_injizieren(&self, punkt: Fehlerpunkt, injektion: FehlerInjektion) {
        tracing::debug!(?punkt, ?injektion, "Fehler-Injektion aktiviert");
        self.fehler.lock().insert(punkt, injektion);
    }

    pub fn fehler_aufheben(&self, punkt: Fehlerpunkt) {
        self.fehler.lock().remove(&punkt);
    }

    fn pruefen(&self, punkt: Fehlerpunkt) -> DbResult<()> {
        let mut aktiv = self.fehler.lock();
        let Some(injektion) = aktiv.get_mut(&punkt) else {
            return Ok(());
        };

        if injektion.erfolge_vorher > 0 {
            injektion.erfolge_vorher -= 1;
            return Ok(());
        }

        match injektion.fehlschlaege {
            Some(0) => {
                aktiv.remove(&punkt);
                Ok(())
            }
            Some(n) => {
                injektion.fehlschlaege = Some(n - 1);
                tracing::warn!(?punkt, "Injizierter Fehler");
                Err(DbError::InjizierterFehler(format!("{punkt:?}")))
            }
            None => {
                tracing::warn!(?punkt, "Injizierter Fehler");
                Err(DbError::InjizierterFehler(format!("{punkt:?}")))
            }
        }
    }
}

#[async_trait]
impl ChatRepository for MemoryDb {
    async fn create_chat(&self, chat: ChatRecord) -> DbResult<()> {
        let mut t = self.tabellen.write();
        if t.chats.contains_key(&chat.id) {
            return Err(DbError::Eindeutigkeit(format!("Chat {}", chat.id)));
        }
        t.mitglieder.entry(chat.id).or_default();
        t.chats.insert(chat.id, chat);
        Ok(())
    }

    async fn get_chat(&self, chat_id: ChatId) -> DbResult<Option<ChatRecord>> {
        Ok(self.tabellen.read().chats.get(&chat_id).cloned())
    }

    async fn set_key_version(&self, chat_id: ChatId, key_version: u64) -> DbResult<()> {
        let mut t = self.tabellen.write();
        let chat = t
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| DbError::nicht_gefunden(format!("Chat {chat_id}")))?;
        chat.key_version = key_version;
        Ok(())
    }

    async fn add_member(&self, chat_id: ChatId, user_id: UserId) -> DbResult<bool> {
        let mut t = self.tabellen.write();
        if !t.chats.contains_key(&chat_id) {
            return Err(DbError::nicht_gefunden(format!("Chat {chat_id}")));
        }
        Ok(t.mitglieder.entry(chat_id).or_default().insert(user_id))
    }

    async fn remove_member(&self, chat_id: ChatId, user_id: UserId) -> DbResult<bool> {
        let mut t = self.tabellen.write();
        Ok(t
            .mitglieder
            .get_mut(&chat_id)
            .map(|m| m.remove(&user_id))
            .unwrap_or(false))
    }

    async fn list_members(&self, chat_id: ChatId) -> DbResult<Vec<UserId>> {
        Ok(self
            .tabellen
            .read()
            .mitglieder
            .get(&chat_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn is_member(&self, chat_id: ChatId, user_id: UserId) -> DbResult<bool> {
        Ok(self
            .tabellen
            .read()
            .mitglieder
            .get(&chat_id)
            .is_some_and(|m| m.contains(&user_id)))
    }
}

#[async_trait]
impl EnvelopeRepository for MemoryDb {
    async fn get_chat_member_envelope(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> DbResult<Option<EnvelopeRecord>> {
        Ok(self
            .tabellen
            .read()
            .umschlaege
            .get(&(chat_id, user_id))
            .cloned())
    }

    async fn put_chat_member_envelope(&self, envelope: EnvelopeRecord) -> DbResult<()> {
        self.pruefen(Fehlerpunkt::UmschlagSchreiben)?;
        self.tabellen
            .write()
            .umschlaege
            .insert((envelope.chat_id, envelope.user_id), envelope);
        Ok(())
    }

    async fn delete_chat_member_envelope(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> DbResult<bool> {
        Ok(self
            .tabellen
            .write()
            .umschlaege
            .remove(&(chat_id, user_id))
            .is_some())
    }

    async fn list_envelopes(&self, chat_id: ChatId) -> DbResult<Vec<EnvelopeRecord>> {
        let mut liste: Vec<EnvelopeRecord> = self
            .tabellen
            .read()
            .umschlaege
            .values()
            .filter(|u| u.chat_id == chat_id)
            .cloned()
            .collect();
        liste.sort_by_key(|u| u.user_id);
        Ok(liste)
    }
}

#[async_trait]
impl MessageRepository for MemoryDb {
    async fn insert_message(&self, message: NachrichtRecord) -> DbResult<()> {
        self.pruefen(Fehlerpunkt::NachrichtEinfuegen)?;
        let mut t = self.tabellen.write();
        if t.nachrichten.contains_key(&message.message_id) {
            return Err(DbError::Eindeutigkeit(format!(
                "Nachricht {}",
                message.message_id
            )));
        }
        t.nachrichten.insert(message.message_id, message);
        Ok(())
    }

    async fn get_messages_for_chat(&self, chat_id: ChatId) -> DbResult<Vec<NachrichtRecord>> {
        let mut liste: Vec<NachrichtRecord> = self
            .tabellen
            .read()
            .nachrichten
            .values()
            .filter(|n| n.chat_id == chat_id)
            .cloned()
            .collect();
        liste.sort_by_key(|n| (n.timestamp_millis, n.message_id));
        Ok(liste)
    }

    async fn update_message_ciphertext(
        &self,
        message_id: MessageId,
        ciphertext: Vec<u8>,
        key_version: u64,
    ) -> DbResult<()> {
        self.pruefen(Fehlerpunkt::NachrichtAktualisieren)?;
        let mut t = self.tabellen.write();
        let nachricht = t
            .nachrichten
            .get_mut(&message_id)
            .ok_or_else(|| DbError::nicht_gefunden(format!("Nachricht {message_id}")))?;
        nachricht.ciphertext = ciphertext;
        nachricht.key_version = key_version;
        Ok(())
    }
}

#[async_trait]
impl InviteRepository for MemoryDb {
    async fn create_invite(&self, invite: EinladungRecord) -> DbResult<()> {
        let mut t = self.tabellen.write();
        if t.einladungen.contains_key(&invite.id) {
            return Err(DbError::Eindeutigkeit(format!("Einladung {}", invite.id)));
        }
        t.einladungen.insert(invite.id, invite);
        Ok(())
    }

    async fn get_invite(&self, invite_id: InviteId) -> DbResult<Option<EinladungRecord>> {
        Ok(self.tabellen.read().einladungen.get(&invite_id).cloned())
    }

    async fn delete_invite(&self, invite_id: InviteId) -> DbResult<bool> {
        Ok(self.tabellen.write().einladungen.remove(&invite_id).is_some())
    }
}

#[async_trait]
impl KeyDirectory for MemoryDb {
    async fn put_user_keys(&self, user_id: UserId, keys: SchluesselRecord) -> DbResult<()> {
        self.tabellen.write().schluessel.insert(user_id, keys);
        Ok(())
    }

    async fn get_public_key(&self, user_id: UserId) -> DbResult<(Vec<u8>, Vec<u8>)> {
        self.tabellen
            .read()
            .schluessel
            .get(&user_id)
            .map(|k| (k.public_e.clone(), k.modulus.clone()))
            .ok_or_else(|| DbError::nicht_gefunden(format!("Schluessel von {user_id}")))
    }

    async fn get_private_key(&self, user_id: UserId) -> DbResult<(Vec<u8>, Vec<u8>)> {
        self.tabellen
            .read()
            .schluessel
            .get(&user_id)
            .map(|k| (k.private_d.clone(), k.modulus.clone()))
            .ok_or_else(|| DbError::nicht_gefunden(format!("Schluessel von {user_id}")))
    }

    async fn put_custody_keys(&self, keys: SchluesselRecord) -> DbResult<()> {
        self.tabellen.write().verwahrung = Some(keys);
        Ok(())
    }

    async fn get_custody_keys(&self) -> DbResult<Option<SchluesselRecord>> {
        Ok(self.tabellen.read().verwahrung.clone())
    }
}

#[async_trait]
impl RotationJobRepository for MemoryDb {
    async fn put_job(&self, job: RotationJobRecord) -> DbResult<()> {
        self.pruefen(Fehlerpunkt::JobSchreiben)?;
        self.tabellen.write().jobs.insert(job.chat_id, job);
        Ok(())
    }

    async fn get_job(&self, chat_id: ChatId) -> DbResult<Option<RotationJobRecord>> {
        Ok(self.tabellen.read().jobs.get(&chat_id).cloned())
    }

    async fn delete_job(&self, chat_id: ChatId) -> DbResult<bool> {
        Ok(self.tabellen.write().jobs.remove(&chat_id).is_some())
    }
}

#[async_trait]
impl SessionRepository for MemoryDb {
    async fn put_session(&self, session: SessionRecord) -> DbResult<()> {
        self.pruefen(Fehlerpunkt::SitzungSchreiben)?;
        self.tabellen
            .write()
            .sitzungen
            .insert(session.user_id, session);
        Ok(())
    }

    async fn get_session(&self, user_id: UserId) -> DbResult<Option<SessionRecord>> {
        Ok(self.tabellen.read().sitzungen.get(&user_id).cloned())
    }

    async fn delete_session(&self, user_id: UserId) -> DbResult<bool> {
        self.pruefen(Fehlerpunkt::SitzungLoeschen)?;
        Ok(self.tabellen.write().sitzungen.remove(&user_id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
