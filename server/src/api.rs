//! Service-Grenze
//!
//! Jede Operation ausser Registrierung und Anmeldung verlangt ein gueltiges
//! Session-Token. Alle Fehler werden in `ServiceError::{Rejected, Fault}`
//! ueberfuehrt; Token-Fehler erscheinen einheitlich als `Unauthenticated`.

use std::sync::Arc;

use tracing::{debug, error, info};
use tresor_auth::SessionToken;
use tresor_chat::{
    schluessel_record, ChatInfo, Einladung, EntschluesselteNachricht, GesendeteNachricht,
    GrantErgebnis,
};
use tresor_core::{Ablehnung, ChatId, InviteId, ServiceError, ServiceResult, UserId};
use tresor_crypto::generate_keypair_with_bits;
use tresor_db::{DbError, KeyDirectory};

use crate::AppKontext;

/// Fassade fuer alle Aufrufe von aussen
#[derive(Clone)]
pub struct TresorApi {
    kontext: Arc<AppKontext>,
}

impl TresorApi {
    pub fn neu(kontext: Arc<AppKontext>) -> Self {
        Self { kontext }
    }

    /// Registriert einen Benutzer und legt sein RSA-Schluesselpaar in
    /// Server-Verwahrung ab
    pub async fn benutzer_registrieren(&self) -> ServiceResult<UserId> {
        let bits = self.kontext.rsa_primzahl_bits;
        let paar = tokio::task::spawn_blocking(move || generate_keypair_with_bits(bits))
            .await
            .map_err(|e| ServiceError::fault(format!("Schluesselerzeugung abgebrochen: {e}")))?
            .map_err(|e| ServiceError::fault(e.to_string()))?;

        let user_id = UserId::new();
        self.kontext
            .db
            .put_user_keys(user_id, schluessel_record(&paar))
            .await
            .map_err(|e| ServiceError::fault(e.to_string()))?;

        info!(user_id = %user_id, "Benutzer registriert");
        Ok(user_id)
    }

    /// Meldet einen registrierten Benutzer an und startet die Token-Erneuerung
    pub async fn anmelden(&self, user_id: UserId) -> ServiceResult<SessionToken> {
        match self.kontext.db.get_public_key(user_id).await {
            Ok(_) => {}
            Err(DbError::NichtGefunden(_)) => {
                return Err(ServiceError::Rejected(Ablehnung::Unauthenticated))
            }
            Err(e) => return Err(ServiceError::fault(e.to_string())),
        }

        let token = self.kontext.sitzungen.anmelden(user_id).await?;
        let task = self.kontext.sitzungen.refresh_task_starten(user_id);
        if let Some(alt) = self.kontext.refresh_tasks.insert(user_id, task) {
            alt.abort();
        }
        Ok(token)
    }

    /// Aktuelles Token einer Sitzung (nach Erneuerungen ein anderes als bei der Anmeldung)
    pub async fn aktuelles_token(&self, token: &str) -> ServiceResult<SessionToken> {
        let user_id = self.authentifizieren(token)?;
        self.kontext
            .sitzungen
            .aktuelles_token(user_id)
            .ok_or(ServiceError::Rejected(Ablehnung::Unauthenticated))
    }

    /// Trennt die Sitzung; mit aktiver Sperrliste wird das Token ungueltig
    pub async fn abmelden(&self, token: &str) -> ServiceResult<bool> {
        let user_id = self.authentifizieren(token)?;
        if let Some((_, task)) = self.kontext.refresh_tasks.remove(&user_id) {
            task.abort();
        }
        Ok(self.kontext.sitzungen.trennen(user_id).await?)
    }

    pub async fn chat_erstellen(&self, token: &str, name: &str) -> ServiceResult<ChatInfo> {
        let user_id = self.authentifizieren(token)?;
        Ok(self.kontext.chat.chat_erstellen(user_id, name).await?)
    }

    pub async fn chat_laden(&self, token: &str, chat_id: ChatId) -> ServiceResult<ChatInfo> {
        let user_id = self.authentifizieren(token)?;
        Ok(self.kontext.chat.chat_laden(chat_id, user_id).await?)
    }

    pub async fn mitglieder_auflisten(
        &self,
        token: &str,
        chat_id: ChatId,
    ) -> ServiceResult<Vec<UserId>> {
        let user_id = self.authentifizieren(token)?;
        Ok(self.kontext.chat.mitglieder_auflisten(chat_id, user_id).await?)
    }

    pub async fn nachricht_senden(
        &self,
        token: &str,
        chat_id: ChatId,
        klartext: &[u8],
    ) -> ServiceResult<GesendeteNachricht> {
        let user_id = self.authentifizieren(token)?;
        Ok(self
            .kontext
            .chat
            .nachricht_senden(chat_id, user_id, klartext)
            .await?)
    }

    pub async fn history_laden(
        &self,
        token: &str,
        chat_id: ChatId,
    ) -> ServiceResult<Vec<EntschluesselteNachricht>> {
        let user_id = self.authentifizieren(token)?;
        Ok(self.kontext.chat.history_laden(chat_id, user_id).await?)
    }

    pub async fn einladung_erstellen(
        &self,
        token: &str,
        chat_id: ChatId,
        invitee: UserId,
    ) -> ServiceResult<Einladung> {
        let user_id = self.authentifizieren(token)?;
        Ok(self
            .kontext
            .chat
            .einladung_erstellen(chat_id, user_id, invitee)
            .await?)
    }

    pub async fn einladung_annehmen(
        &self,
        token: &str,
        invite_id: InviteId,
    ) -> ServiceResult<GrantErgebnis> {
        let user_id = self.authentifizieren(token)?;
        Ok(self.kontext.chat.einladung_annehmen(invite_id, user_id).await?)
    }

    /// Entfernt ein Mitglied; eine gescheiterte Rotation wird als Stoerung gemeldet
    pub async fn mitglied_entfernen(
        &self,
        token: &str,
        chat_id: ChatId,
        member: UserId,
    ) -> ServiceResult<u64> {
        let user_id = self.authentifizieren(token)?;
        self.kontext
            .chat
            .mitglied_entfernen(chat_id, user_id, member)
            .await
            .map_err(rotationsfehler_melden)
    }

    pub async fn verlassen(&self, token: &str, chat_id: ChatId) -> ServiceResult<u64> {
        let user_id = self.authentifizieren(token)?;
        self.kontext
            .chat
            .verlassen(chat_id, user_id)
            .await
            .map_err(rotationsfehler_melden)
    }

    /// Betreiber-Aktion: setzt eine abgebrochene Rotation fort
    pub async fn rotation_fortsetzen(&self, chat_id: ChatId) -> ServiceResult<u64> {
        self.kontext
            .chat
            .rotation_fortsetzen(chat_id)
            .await
            .map_err(rotationsfehler_melden)
    }

    fn authentifizieren(&self, token: &str) -> ServiceResult<UserId> {
        self.kontext.tokens.authenticate(token).map_err(|e| {
            debug!("Token abgewiesen");
            ServiceError::from(e)
        })
    }
}

fn rotationsfehler_melden(e: tresor_chat::ChatError) -> ServiceError {
    if e.ist_rotation_abgebrochen() {
        error!(fehler = %e, "Mitgliedschaftsaenderung nicht vollstaendig, Rotation muss fortgesetzt werden");
    }
    e.into()
}
