//! ChatService – Chats, Einladungen, Mitgliedschaft, verschluesselte Nachrichten

use std::sync::Arc;

use tracing::{info, warn};

use tresor_core::{ChatId, Clock, InviteId, MessageId, UserId};
use tresor_crypto::{decrypt_message, encrypt_message, MessageIdentity, WrappedKeyEnvelope};
use tresor_db::{ChatRecord, ChatStore, EinladungRecord, NachrichtRecord, NO_KEY};

use crate::error::{ChatError, ChatResult};
use crate::key_manager::GroupKeyManager;
use crate::types::{
    ChatInfo, Einladung, EntschluesselteNachricht, GesendeteNachricht, GrantErgebnis,
    MAX_NACHRICHT_BYTES, MAX_NAME_LAENGE,
};

/// ChatService verwaltet Chats und deren verschluesselte Nachrichten
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    schluessel: Arc<GroupKeyManager>,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    /// Erstellt einen neuen ChatService
    pub fn neu(
        store: Arc<dyn ChatStore>,
        schluessel: Arc<GroupKeyManager>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            schluessel,
            clock,
        })
    }

    pub fn schluessel(&self) -> &Arc<GroupKeyManager> {
        &self.schluessel
    }

    /// Chat anlegen; der Ersteller wird erstes Mitglied und erhaelt Version 1
    pub async fn chat_erstellen(&self, creator: UserId, name: &str) -> ChatResult<ChatInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::UngueltigeEingabe(
                "Chat-Name darf nicht leer sein".into(),
            ));
        }
        if name.chars().count() > MAX_NAME_LAENGE {
            return Err(ChatError::UngueltigeEingabe(format!(
                "Chat-Name zu lang (Maximum: {MAX_NAME_LAENGE} Zeichen)"
            )));
        }

        // Ohne Schluesselpaar bliebe ein Chat ohne Schluessel zurueck
        self.store.get_public_key(creator).await?;

        let record = ChatRecord {
            id: ChatId::new(),
            name: name.to_string(),
            creator_id: creator,
            key_version: NO_KEY,
            created_at_millis: self.clock.jetzt_millis(),
        };
        let chat_id = record.id;
        self.store.create_chat(record.clone()).await?;
        self.store.add_member(chat_id, creator).await?;
        let version = self.schluessel.create_key(chat_id, creator).await?;

        info!(chat_id = %chat_id, creator = %creator, "Chat erstellt");
        let mut info = ChatInfo::from(record);
        info.key_version = version;
        Ok(info)
    }

    pub async fn chat_laden(&self, chat_id: ChatId, leser: UserId) -> ChatResult<ChatInfo> {
        let chat = self.chat_record(chat_id).await?;
        self.mitglied_pruefen(chat_id, leser).await?;
        Ok(chat.into())
    }

    pub async fn mitglieder_auflisten(
        &self,
        chat_id: ChatId,
        leser: UserId,
    ) -> ChatResult<Vec<UserId>> {
        self.mitglied_pruefen(chat_id, leser).await?;
        Ok(self.store.list_members(chat_id).await?)
    }

    /// Nachricht verschluesseln und speichern
    ///
    /// Schluesselabruf und Speichern erfolgen unter derselben Chat-Sperre,
    /// damit keine Rotation dazwischen laufen kann.
    pub async fn nachricht_senden(
        &self,
        chat_id: ChatId,
        sender: UserId,
        klartext: &[u8],
    ) -> ChatResult<GesendeteNachricht> {
        if klartext.is_empty() {
            return Err(ChatError::UngueltigeEingabe(
                "Nachrichteninhalt darf nicht leer sein".into(),
            ));
        }
        if klartext.len() > MAX_NACHRICHT_BYTES {
            return Err(ChatError::UngueltigeEingabe(format!(
                "Nachricht zu lang: {} Bytes (Maximum: {MAX_NACHRICHT_BYTES})",
                klartext.len()
            )));
        }

        let sperre = self.schluessel.sperren(chat_id).await;
        let (version, plan) = self.schluessel.current_key_gesperrt(&sperre, sender).await?;

        let identitaet =
            MessageIdentity::new(chat_id, self.clock.jetzt_millis(), MessageId::new());
        let ciphertext = encrypt_message(klartext, &identitaet, &plan);

        self.store
            .insert_message(NachrichtRecord {
                message_id: identitaet.message_id,
                chat_id,
                sender_id: sender,
                timestamp_millis: identitaet.timestamp_millis,
                key_version: version,
                ciphertext,
            })
            .await?;

        Ok(GesendeteNachricht {
            message_id: identitaet.message_id,
            chat_id,
            timestamp_millis: identitaet.timestamp_millis,
            key_version: version,
        })
    }

    /// Gesamte History eines Chats entschluesselt laden
    pub async fn history_laden(
        &self,
        chat_id: ChatId,
        leser: UserId,
    ) -> ChatResult<Vec<EntschluesselteNachricht>> {
        let sperre = self.schluessel.sperren(chat_id).await;
        let (version, plan) = self.schluessel.current_key_gesperrt(&sperre, leser).await?;

        let records = self.store.get_messages_for_chat(chat_id).await?;
        let mut history = Vec::with_capacity(records.len());
        for record in records {
            if record.key_version != version {
                return Err(ChatError::VersionKonflikt {
                    erwartet: version,
                    gefunden: record.key_version,
                });
            }
            let identitaet =
                MessageIdentity::new(record.chat_id, record.timestamp_millis, record.message_id);
            let inhalt = decrypt_message(&record.ciphertext, &identitaet, &plan)?;
            history.push(EntschluesselteNachricht {
                message_id: record.message_id,
                sender_id: record.sender_id,
                timestamp_millis: record.timestamp_millis,
                key_version: record.key_version,
                inhalt,
            });
        }
        Ok(history)
    }

    /// Einladung erstellen; der Umschlag wird sofort verpackt
    pub async fn einladung_erstellen(
        &self,
        chat_id: ChatId,
        inviter: UserId,
        invitee: UserId,
    ) -> ChatResult<Einladung> {
        if inviter == invitee {
            return Err(ChatError::UngueltigeEingabe(
                "Selbst-Einladung nicht moeglich".into(),
            ));
        }

        let sperre = self.schluessel.sperren(chat_id).await;
        if self.store.is_member(chat_id, invitee).await? {
            return Err(ChatError::UngueltigeEingabe(format!(
                "{invitee} ist bereits Mitglied"
            )));
        }
        let envelope = self
            .schluessel
            .wrap_for_invite_gesperrt(&sperre, inviter, invitee)
            .await?;

        let record = EinladungRecord {
            id: InviteId::new(),
            chat_id,
            inviter_id: inviter,
            invitee_id: invitee,
            key_version: envelope.key_version,
            envelope_ciphertext: envelope.ciphertext,
            created_at_millis: self.clock.jetzt_millis(),
        };
        self.store.create_invite(record.clone()).await?;

        info!(
            chat_id = %chat_id,
            invite_id = %record.id,
            version = record.key_version,
            "Einladung erstellt"
        );
        Ok(Einladung::from(&record))
    }

    /// Einladung annehmen (nur durch den Eingeladenen)
    ///
    /// Wurde zwischenzeitlich rotiert, wird der Umschlag neu verpackt.
    pub async fn einladung_annehmen(
        &self,
        invite_id: InviteId,
        user: UserId,
    ) -> ChatResult<GrantErgebnis> {
        let chat_id = self.einladung_laden(invite_id, user).await?.chat_id;

        let sperre = self.schluessel.sperren(chat_id).await;
        // Erneut unter der Sperre lesen, falls parallel angenommen wurde
        let einladung = self.einladung_laden(invite_id, user).await?;

        let envelope = WrappedKeyEnvelope {
            key_version: einladung.key_version,
            ciphertext: einladung.envelope_ciphertext,
        };
        let ergebnis = self
            .schluessel
            .grant_member_gesperrt(&sperre, user, &envelope)
            .await?;
        self.store.add_member(chat_id, user).await?;
        self.store.delete_invite(invite_id).await?;

        info!(
            chat_id = %chat_id,
            member = %user,
            version = ergebnis.version(),
            "Einladung angenommen"
        );
        Ok(ergebnis)
    }

    /// Mitglied entfernen und Schluessel rotieren
    ///
    /// Erlaubt fuer das Mitglied selbst und fuer den Ersteller des Chats,
    /// solange dieser selbst noch Mitglied ist.
    /// Gibt die neue Schluessel-Version zurueck. Scheitert die Rotation, ist
    /// das Mitglied zwar entfernt, der Aufruf liefert aber den Fehler.
    pub async fn mitglied_entfernen(
        &self,
        chat_id: ChatId,
        requester: UserId,
        member: UserId,
    ) -> ChatResult<u64> {
        let chat = self.chat_record(chat_id).await?;
        if requester != member && requester != chat.creator_id {
            return Err(ChatError::MembershipViolation(
                "Nur der Ersteller oder das Mitglied selbst darf entfernen".into(),
            ));
        }

        let sperre = self.schluessel.sperren(chat_id).await;
        // Auch der Ersteller darf nach seinem Austritt niemanden mehr entfernen
        if requester != member && !self.store.is_member(chat_id, requester).await? {
            return Err(ChatError::MembershipViolation(format!(
                "{requester} ist kein Mitglied von Chat {chat_id}"
            )));
        }
        if self.schluessel.rotation_ausstehend(chat_id).await? {
            return Err(ChatError::RotationAusstehend(chat_id));
        }
        if !self.store.remove_member(chat_id, member).await? {
            return Err(ChatError::MembershipViolation(format!(
                "{member} ist kein Mitglied von Chat {chat_id}"
            )));
        }
        self.store
            .delete_chat_member_envelope(chat_id, member)
            .await?;
        info!(chat_id = %chat_id, member = %member, "Mitglied entfernt");

        match self.schluessel.rotate_key_gesperrt(&sperre).await {
            Ok(version) => Ok(version),
            Err(e) => {
                warn!(
                    chat_id = %chat_id,
                    member = %member,
                    "Entfernung nicht vollstaendig: {e}"
                );
                Err(e)
            }
        }
    }

    /// Freiwilliger Austritt
    pub async fn verlassen(&self, chat_id: ChatId, member: UserId) -> ChatResult<u64> {
        self.mitglied_entfernen(chat_id, member, member).await
    }

    /// Setzt eine abgebrochene Rotation fort (Betreiber-Aktion)
    pub async fn rotation_fortsetzen(&self, chat_id: ChatId) -> ChatResult<u64> {
        self.schluessel.resume_rotation(chat_id).await
    }

    async fn chat_record(&self, chat_id: ChatId) -> ChatResult<ChatRecord> {
        self.store
            .get_chat(chat_id)
            .await?
            .ok_or(ChatError::ChatNichtGefunden(chat_id))
    }

    async fn mitglied_pruefen(&self, chat_id: ChatId, user: UserId) -> ChatResult<()> {
        self.chat_record(chat_id).await?;
        if !self.store.is_member(chat_id, user).await? {
            return Err(ChatError::MembershipViolation(format!(
                "{user} ist kein Mitglied von Chat {chat_id}"
            )));
        }
        Ok(())
    }

    async fn einladung_laden(&self, invite_id: InviteId, user: UserId) -> ChatResult<EinladungRecord> {
        let einladung = self
            .store
            .get_invite(invite_id)
            .await?
            .ok_or(ChatError::EinladungNichtGefunden(invite_id))?;
        if einladung.invitee_id != user {
            return Err(ChatError::MembershipViolation(
                "Einladung gilt fuer einen anderen Benutzer".into(),
            ));
        }
        Ok(einladung)
    }
}
