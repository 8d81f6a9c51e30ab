//! Gruppen-Schluessel-Verwaltung (Key Manager)
//!
//! Verwaltet den Schluessel-Lebenszyklus pro Chat (`NO_KEY -> ACTIVE(v)`):
//! - Erstellen des ersten Schluessels bei Chat-Erstellung
//! - Verpacken fuer Einladungen und Uebernahme bei Annahme
//! - Rotation bei Austritt inklusive Umschluesselung der gesamten History
//!
//! Alle veraendernden Operationen und jeder Schluesselabruf laufen unter
//! einer exklusiven Sperre pro Chat. Wer mehrere Schritte atomar ausfuehren
//! muss (z.B. Schluessel holen und Nachricht speichern), nimmt die Sperre
//! mit [`GroupKeyManager::sperren`] selbst und ruft die `*_gesperrt`-Varianten.
//!
//! Eine Rotation wird vor dem ersten Schreibzugriff im Journal vermerkt.
//! Beide Schluessel liegen dort mit dem Verwahrungs-Schluessel des Servers
//! verpackt, sodass eine abgebrochene Rotation mit
//! [`GroupKeyManager::resume_rotation`] fortgesetzt werden kann.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use tresor_core::{ChatId, Clock, UserId};
use tresor_crypto::{
    create_group_key, generate_keypair_with_bits, reencrypt_message, unwrap_key,
    unwrap_key_for_member, wrap_key, wrap_key_for_member, MessageIdentity, RawGroupKey,
    RoundKeySchedule, RsaKeyPair, RsaPrivateKey, RsaPublicKey, WrappedKeyEnvelope,
};
use tresor_db::{ChatRecord, ChatStore, EnvelopeRecord, RotationJobRecord};

use crate::error::{ChatError, ChatResult};
use crate::types::{schluessel_record, schluesselpaar, GrantErgebnis, ERSTE_VERSION};

type SperrTabelle = DashMap<ChatId, Arc<Mutex<()>>>;

/// Gehaltene exklusive Sperre fuer genau einen Chat
///
/// Dient den `*_gesperrt`-Methoden als Nachweis, dass der Aufrufer die
/// Sperre haelt. Wird beim Drop freigegeben; wartet niemand mehr auf den
/// Chat, verschwindet auch sein Eintrag aus der Sperr-Tabelle.
pub struct ChatSperre {
    chat_id: ChatId,
    guard: Option<OwnedMutexGuard<()>>,
    tabelle: Arc<SperrTabelle>,
}

impl ChatSperre {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }
}

impl Drop for ChatSperre {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Nur die Tabelle selbst haelt den Mutex noch
        self.tabelle
            .remove_if(&self.chat_id, |_, m| Arc::strong_count(m) == 1);
    }
}

impl std::fmt::Debug for ChatSperre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSperre")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Verwaltet Gruppen-Schluessel fuer alle Chats
pub struct GroupKeyManager {
    store: Arc<dyn ChatStore>,
    clock: Arc<dyn Clock>,
    /// Eine Sperre pro Chat (chat_id -> Mutex)
    sperren: Arc<SperrTabelle>,
    /// Schluesselpaar fuer das Rotations-Journal
    verwahrung: RsaKeyPair,
}

impl GroupKeyManager {
    /// Erstellt einen Key Manager mit gegebenem Verwahrungs-Schluesselpaar
    pub fn neu(
        store: Arc<dyn ChatStore>,
        clock: Arc<dyn Clock>,
        verwahrung: RsaKeyPair,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            sperren: Arc::new(DashMap::new()),
            verwahrung,
        })
    }

    /// Laedt das Verwahrungs-Schluesselpaar aus dem Store oder erzeugt es
    ///
    /// Ein Journal kann nur mit dem Paar fortgesetzt werden, mit dem es
    /// geschrieben wurde; deshalb wird ein einmal erzeugtes Paar abgelegt.
    pub async fn laden_oder_erzeugen(
        store: Arc<dyn ChatStore>,
        clock: Arc<dyn Clock>,
        prime_bits: usize,
    ) -> ChatResult<Arc<Self>> {
        let verwahrung = match store.get_custody_keys().await? {
            Some(record) => schluesselpaar(&record)?,
            None => {
                let paar = generate_keypair_with_bits(prime_bits)?;
                store.put_custody_keys(schluessel_record(&paar)).await?;
                info!(
                    modulus_bits = paar.public.modulus_bits(),
                    "Verwahrungs-Schluesselpaar erzeugt"
                );
                paar
            }
        };
        Ok(Self::neu(store, clock, verwahrung))
    }

    /// Wartet auf die exklusive Sperre eines Chats
    pub async fn sperren(&self, chat_id: ChatId) -> ChatSperre {
        let mutex = Arc::clone(self.sperren.entry(chat_id).or_default().value());
        ChatSperre {
            chat_id,
            guard: Some(mutex.lock_owned().await),
            tabelle: Arc::clone(&self.sperren),
        }
    }

    /// Anzahl der Chats mit gehaltener oder angeforderter Sperre
    pub(crate) fn anzahl_sperren(&self) -> usize {
        self.sperren.len()
    }

    // -----------------------------------------------------------------------
    // Oeffentliche Operationen (nehmen die Sperre selbst)
    // -----------------------------------------------------------------------

    /// `NO_KEY -> ACTIVE(1)`: erzeugt den ersten Schluessel fuer den Ersteller
    pub async fn create_key(&self, chat_id: ChatId, creator: UserId) -> ChatResult<u64> {
        let sperre = self.sperren(chat_id).await;
        self.create_key_gesperrt(&sperre, creator).await
    }

    /// Verpackt den aktuellen Schluessel fuer einen Eingeladenen
    pub async fn wrap_for_invite(
        &self,
        chat_id: ChatId,
        inviter: UserId,
        invitee: UserId,
    ) -> ChatResult<WrappedKeyEnvelope> {
        let sperre = self.sperren(chat_id).await;
        self.wrap_for_invite_gesperrt(&sperre, inviter, invitee).await
    }

    /// Legt den Umschlag eines neuen Mitglieds ab
    pub async fn grant_member(
        &self,
        chat_id: ChatId,
        member: UserId,
        envelope: &WrappedKeyEnvelope,
    ) -> ChatResult<GrantErgebnis> {
        let sperre = self.sperren(chat_id).await;
        self.grant_member_gesperrt(&sperre, member, envelope).await
    }

    /// Liefert `(Version, Rundenschluessel)` des aktuellen Schluessels
    pub async fn current_key(
        &self,
        chat_id: ChatId,
        member: UserId,
    ) -> ChatResult<(u64, RoundKeySchedule)> {
        let sperre = self.sperren(chat_id).await;
        self.current_key_gesperrt(&sperre, member).await
    }

    /// `ACTIVE(v) -> ACTIVE(v+1)` fuer die verbliebenen Mitglieder
    pub async fn rotate_key(&self, chat_id: ChatId) -> ChatResult<u64> {
        let sperre = self.sperren(chat_id).await;
        self.rotate_key_gesperrt(&sperre).await
    }

    /// Setzt eine abgebrochene Rotation aus dem Journal fort
    ///
    /// Idempotent: bereits migrierte Umschlaege und Nachrichten werden
    /// uebersprungen. Ohne Journal wird die aktuelle Version zurueckgegeben.
    pub async fn resume_rotation(&self, chat_id: ChatId) -> ChatResult<u64> {
        let sperre = self.sperren(chat_id).await;

        let Some(job) = self.store.get_job(chat_id).await? else {
            return Ok(self.chat_laden(chat_id).await?.key_version);
        };

        info!(
            chat_id = %chat_id,
            von = job.from_version,
            ziel = job.target_version,
            "Setze Schluesselrotation fort"
        );

        let alt = self.aus_verwahrung(&job.old_key_wrapped)?;
        let neu = self.aus_verwahrung(&job.new_key_wrapped)?;

        self.rotation_ausfuehren(&sperre, &alt, &neu, job.from_version, job.target_version)
            .await?;
        Ok(job.target_version)
    }

    /// Gibt true zurueck solange ein Rotations-Journal fuer den Chat existiert
    pub async fn rotation_ausstehend(&self, chat_id: ChatId) -> ChatResult<bool> {
        Ok(self.store.get_job(chat_id).await?.is_some())
    }

    // -----------------------------------------------------------------------
    // Varianten unter gehaltener Sperre
    // -----------------------------------------------------------------------

    pub async fn create_key_gesperrt(
        &self,
        sperre: &ChatSperre,
        creator: UserId,
    ) -> ChatResult<u64> {
        let chat_id = sperre.chat_id();
        let chat = self.chat_laden(chat_id).await?;
        if chat.hat_schluessel() {
            return Err(ChatError::SchluesselExistiert(chat_id));
        }
        self.mitglied_pruefen(chat_id, creator).await?;

        let key = create_group_key();
        let public = self.oeffentlicher_schluessel(creator).await?;
        let envelope = wrap_key_for_member(&key, ERSTE_VERSION, &public)?;
        self.umschlag_ablegen(chat_id, creator, envelope).await?;
        self.store.set_key_version(chat_id, ERSTE_VERSION).await?;

        info!(chat_id = %chat_id, creator = %creator, "Gruppen-Schluessel erstellt");
        Ok(ERSTE_VERSION)
    }

    pub async fn wrap_for_invite_gesperrt(
        &self,
        sperre: &ChatSperre,
        inviter: UserId,
        invitee: UserId,
    ) -> ChatResult<WrappedKeyEnvelope> {
        let chat_id = sperre.chat_id();
        let chat = self.aktiven_chat_laden(chat_id).await?;
        self.mitglied_pruefen(chat_id, inviter).await?;

        let key = self
            .schluessel_des_mitglieds(chat_id, inviter, chat.key_version)
            .await?;
        let public = self.oeffentlicher_schluessel(invitee).await?;
        let envelope = wrap_key_for_member(&key, chat.key_version, &public)?;

        debug!(
            chat_id = %chat_id,
            invitee = %invitee,
            version = chat.key_version,
            "Schluessel fuer Einladung verpackt"
        );
        Ok(envelope)
    }

    /// Uebernimmt einen Einladungs-Umschlag
    ///
    /// Ist der Umschlag aelter als die aktuelle Version, wird der aktuelle
    /// Schluessel aus dem Umschlag eines bestehenden Mitglieds gewonnen und
    /// neu verpackt. Umschlaege aus der Zukunft werden abgelehnt.
    pub async fn grant_member_gesperrt(
        &self,
        sperre: &ChatSperre,
        member: UserId,
        envelope: &WrappedKeyEnvelope,
    ) -> ChatResult<GrantErgebnis> {
        let chat_id = sperre.chat_id();
        let chat = self.aktiven_chat_laden(chat_id).await?;
        let aktuell = chat.key_version;

        if envelope.key_version > aktuell {
            return Err(ChatError::VersionKonflikt {
                erwartet: aktuell,
                gefunden: envelope.key_version,
            });
        }

        if envelope.key_version == aktuell {
            self.umschlag_ablegen(chat_id, member, envelope.clone())
                .await?;
            info!(chat_id = %chat_id, member = %member, version = aktuell, "Mitglied aufgenommen");
            return Ok(GrantErgebnis::Uebernommen { version: aktuell });
        }

        warn!(
            chat_id = %chat_id,
            member = %member,
            umschlag_version = envelope.key_version,
            aktuelle_version = aktuell,
            "Veralteter Einladungs-Umschlag, verpacke neu"
        );

        let key = self.aktuellen_schluessel_wiederherstellen(chat_id, aktuell).await?;
        let public = self.oeffentlicher_schluessel(member).await?;
        let neu = wrap_key_for_member(&key, aktuell, &public)?;
        self.umschlag_ablegen(chat_id, member, neu).await?;

        Ok(GrantErgebnis::NeuVerpackt {
            von_version: envelope.key_version,
            auf_version: aktuell,
        })
    }

    pub async fn current_key_gesperrt(
        &self,
        sperre: &ChatSperre,
        member: UserId,
    ) -> ChatResult<(u64, RoundKeySchedule)> {
        let chat_id = sperre.chat_id();
        let chat = self.aktiven_chat_laden(chat_id).await?;
        self.mitglied_pruefen(chat_id, member).await?;

        let key = self
            .schluessel_des_mitglieds(chat_id, member, chat.key_version)
            .await?;
        Ok((chat.key_version, key.schedule()))
    }

    pub async fn rotate_key_gesperrt(&self, sperre: &ChatSperre) -> ChatResult<u64> {
        let chat_id = sperre.chat_id();
        let chat = self.aktiven_chat_laden(chat_id).await?;
        let von = chat.key_version;

        if self.store.list_members(chat_id).await?.is_empty() {
            warn!(chat_id = %chat_id, version = von, "Keine Mitglieder mehr, Chat verwaist");
            return Ok(von);
        }

        let ziel = von + 1;
        let alt = self.aktuellen_schluessel_wiederherstellen(chat_id, von).await?;
        let neu = create_group_key();

        self.store
            .put_job(RotationJobRecord {
                chat_id,
                from_version: von,
                target_version: ziel,
                old_key_wrapped: wrap_key(alt.as_bytes(), &self.verwahrung.public)?,
                new_key_wrapped: wrap_key(neu.as_bytes(), &self.verwahrung.public)?,
                started_at_millis: self.clock.jetzt_millis(),
            })
            .await?;

        info!(chat_id = %chat_id, von, ziel, "Schluesselrotation gestartet");
        self.rotation_ausfuehren(sperre, &alt, &neu, von, ziel).await?;
        Ok(ziel)
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    /// Schritte 4 bis 6 der Rotation; jeder Fehler ist ein fataler Abbruch
    async fn rotation_ausfuehren(
        &self,
        sperre: &ChatSperre,
        alt: &RawGroupKey,
        neu: &RawGroupKey,
        von: u64,
        ziel: u64,
    ) -> ChatResult<()> {
        let chat_id = sperre.chat_id();
        match self.umschluesseln(chat_id, alt, neu, von, ziel).await {
            Ok((umschlaege, nachrichten)) => {
                self.store.delete_job(chat_id).await?;
                info!(
                    chat_id = %chat_id,
                    version = ziel,
                    umschlaege,
                    nachrichten,
                    "Schluesselrotation abgeschlossen"
                );
                Ok(())
            }
            Err(e) => {
                let grund = e.to_string();
                error!(
                    chat_id = %chat_id,
                    ziel_version = ziel,
                    grund = %grund,
                    "FATAL: Schluesselrotation abgebrochen, Journal bleibt fuer manuelle Fortsetzung bestehen"
                );
                Err(ChatError::RotationAborted {
                    chat_id,
                    ziel_version: ziel,
                    grund,
                })
            }
        }
    }

    /// Verpackt den neuen Schluessel fuer alle Mitglieder und schluesselt
    /// die History um. Gibt die Anzahl migrierter Umschlaege und Nachrichten
    /// zurueck.
    async fn umschluesseln(
        &self,
        chat_id: ChatId,
        alt: &RawGroupKey,
        neu: &RawGroupKey,
        von: u64,
        ziel: u64,
    ) -> ChatResult<(usize, usize)> {
        let mut umschlaege = 0;
        for member in self.store.list_members(chat_id).await? {
            let vorhanden = self.store.get_chat_member_envelope(chat_id, member).await?;
            if vorhanden.is_some_and(|u| u.key_version == ziel) {
                debug!(chat_id = %chat_id, member = %member, "Umschlag bereits migriert");
                continue;
            }
            let public = self.oeffentlicher_schluessel(member).await?;
            let envelope = wrap_key_for_member(neu, ziel, &public)?;
            self.umschlag_ablegen(chat_id, member, envelope).await?;
            umschlaege += 1;
        }
        self.store.set_key_version(chat_id, ziel).await?;

        let alter_plan = alt.schedule();
        let neuer_plan = neu.schedule();
        let mut nachrichten = 0;
        for record in self.store.get_messages_for_chat(chat_id).await? {
            if record.key_version == ziel {
                continue;
            }
            if record.key_version != von {
                return Err(ChatError::VersionKonflikt {
                    erwartet: von,
                    gefunden: record.key_version,
                });
            }

            let identitaet =
                MessageIdentity::new(record.chat_id, record.timestamp_millis, record.message_id);
            let blob =
                reencrypt_message(&record.ciphertext, &identitaet, &alter_plan, &neuer_plan)?;
            self.store
                .update_message_ciphertext(record.message_id, blob, ziel)
                .await?;
            debug!(message_id = %record.message_id, version = ziel, "Nachricht umgeschluesselt");
            nachrichten += 1;
        }

        Ok((umschlaege, nachrichten))
    }

    async fn chat_laden(&self, chat_id: ChatId) -> ChatResult<ChatRecord> {
        self.store
            .get_chat(chat_id)
            .await?
            .ok_or(ChatError::ChatNichtGefunden(chat_id))
    }

    /// Chat mit Schluessel und ohne ausstehende Rotation
    async fn aktiven_chat_laden(&self, chat_id: ChatId) -> ChatResult<ChatRecord> {
        let chat = self.chat_laden(chat_id).await?;
        if self.store.get_job(chat_id).await?.is_some() {
            return Err(ChatError::RotationAusstehend(chat_id));
        }
        if !chat.hat_schluessel() {
            return Err(ChatError::KeinSchluessel(format!("Chat {chat_id}")));
        }
        Ok(chat)
    }

    async fn mitglied_pruefen(&self, chat_id: ChatId, user_id: UserId) -> ChatResult<()> {
        if self.store.is_member(chat_id, user_id).await? {
            Ok(())
        } else {
            Err(ChatError::MembershipViolation(format!(
                "{user_id} ist kein Mitglied von Chat {chat_id}"
            )))
        }
    }

    async fn oeffentlicher_schluessel(&self, user_id: UserId) -> ChatResult<RsaPublicKey> {
        let (e, n) = self.store.get_public_key(user_id).await?;
        Ok(RsaPublicKey::from_parts(&e, &n)?)
    }

    async fn privater_schluessel(&self, user_id: UserId) -> ChatResult<RsaPrivateKey> {
        let (d, n) = self.store.get_private_key(user_id).await?;
        let d = Zeroizing::new(d);
        Ok(RsaPrivateKey::from_parts(&d, &n)?)
    }

    /// Entpackt den Umschlag eines Mitglieds, der `version` enthalten muss
    async fn schluessel_des_mitglieds(
        &self,
        chat_id: ChatId,
        member: UserId,
        version: u64,
    ) -> ChatResult<RawGroupKey> {
        let envelope = self
            .store
            .get_chat_member_envelope(chat_id, member)
            .await?
            .ok_or_else(|| {
                ChatError::KeinSchluessel(format!("kein Umschlag fuer {member} in Chat {chat_id}"))
            })?;

        if envelope.key_version != version {
            return Err(ChatError::VersionKonflikt {
                erwartet: version,
                gefunden: envelope.key_version,
            });
        }

        let private = self.privater_schluessel(member).await?;
        let wrapped = WrappedKeyEnvelope {
            key_version: envelope.key_version,
            ciphertext: envelope.ciphertext,
        };
        Ok(unwrap_key_for_member(&wrapped, &private)?)
    }

    /// Gewinnt den aktuellen Schluessel aus dem Umschlag irgendeines Mitglieds
    async fn aktuellen_schluessel_wiederherstellen(
        &self,
        chat_id: ChatId,
        version: u64,
    ) -> ChatResult<RawGroupKey> {
        for envelope in self.store.list_envelopes(chat_id).await? {
            if envelope.key_version != version
                || !self.store.is_member(chat_id, envelope.user_id).await?
            {
                continue;
            }
            return self
                .schluessel_des_mitglieds(chat_id, envelope.user_id, version)
                .await;
        }
        Err(ChatError::KeinSchluessel(format!(
            "kein Mitglied von Chat {chat_id} haelt Version {version}"
        )))
    }

    async fn umschlag_ablegen(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        envelope: WrappedKeyEnvelope,
    ) -> ChatResult<()> {
        self.store
            .put_chat_member_envelope(EnvelopeRecord {
                chat_id,
                user_id,
                key_version: envelope.key_version,
                ciphertext: envelope.ciphertext,
            })
            .await?;
        Ok(())
    }

    fn aus_verwahrung(&self, wrapped: &[u8]) -> ChatResult<RawGroupKey> {
        let bytes = unwrap_key(wrapped, &self.verwahrung.private)?;
        Ok(RawGroupKey::from_slice(bytes.as_bytes())?)
    }
}

impl std::fmt::Debug for GroupKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeyManager")
            .field("gesperrte_chats", &self.sperren.len())
            .finish_non_exhaustive()
    }
}
