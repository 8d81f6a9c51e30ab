//! Sitzungs-Verwaltung fuer Tresor
//!
//! Jede angemeldete Sitzung haelt ihr aktuelles Token in einem Slot. Ein
//! Hintergrund-Task pro Sitzung erneuert das Token periodisch, bevor es
//! ablaeuft. Pro Sitzung schreibt hoechstens ein Refresh gleichzeitig;
//! Leser sehen immer entweder das alte oder das neue Token vollstaendig.
//!
//! Scheitert das Speichern eines neuen Tokens, wird mit exponentiellem
//! Backoff wiederholt. Nach dem letzten Fehlversuch wird die Sitzung
//! verworfen und eine erneute Anmeldung verlangt.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tresor_core::UserId;
use tresor_db::{SessionRecord, SessionRepository};

use crate::error::{AuthError, AuthResult};
use crate::token::{SessionToken, TokenService};

/// Zeitplan und Wiederholungsregeln fuer die Token-Erneuerung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Abstand zwischen zwei Erneuerungen (kuerzer als die Token-Lebensdauer)
    pub intervall: Duration,
    /// Maximale Anzahl an Versuchen pro Erneuerung
    pub max_versuche: u32,
    /// Wartezeit nach dem ersten Fehlversuch; verdoppelt sich je Versuch
    pub basis_backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            intervall: Duration::from_secs(10 * 60),
            max_versuche: 3,
            basis_backoff: Duration::from_millis(500),
        }
    }
}

impl RefreshPolicy {
    /// Wartezeit nach dem Fehlversuch Nummer `versuch` (ab 1)
    pub fn backoff(&self, versuch: u32) -> Duration {
        self.basis_backoff
            .saturating_mul(1u32 << versuch.saturating_sub(1).min(16))
    }
}

struct SessionSlot {
    token: RwLock<SessionToken>,
    /// Ersetzte Tokens der Sitzung, fuer die Sperrliste beim Trennen
    ersetzt: parking_lot::Mutex<Vec<SessionToken>>,
    /// Genau ein Refresh pro Sitzung gleichzeitig
    schreiber: tokio::sync::Mutex<()>,
}

/// Verwaltet angemeldete Sitzungen und deren Token-Erneuerung
pub struct SessionManager {
    tokens: Arc<TokenService>,
    repo: Arc<dyn SessionRepository>,
    policy: RefreshPolicy,
    sitzungen: DashMap<UserId, Arc<SessionSlot>>,
}

impl SessionManager {
    pub fn new(
        tokens: Arc<TokenService>,
        repo: Arc<dyn SessionRepository>,
        policy: RefreshPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            repo,
            policy,
            sitzungen: DashMap::new(),
        })
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Meldet einen Benutzer an und gibt sein erstes Token zurueck
    ///
    /// Eine bestehende Sitzung desselben Benutzers wird ersetzt.
    pub async fn anmelden(&self, user_id: UserId) -> AuthResult<SessionToken> {
        let token = self.tokens.issue(user_id);
        self.repo.put_session(record(&token)).await?;

        let slot = Arc::new(SessionSlot {
            token: RwLock::new(token.clone()),
            ersetzt: parking_lot::Mutex::new(Vec::new()),
            schreiber: tokio::sync::Mutex::new(()),
        });
        self.sitzungen.insert(user_id, slot);

        tracing::info!(user_id = %user_id, "Sitzung angemeldet");
        Ok(token)
    }

    /// Aktuell gueltiges Token einer Sitzung
    pub fn aktuelles_token(&self, user_id: UserId) -> Option<SessionToken> {
        self.sitzungen
            .get(&user_id)
            .map(|slot| slot.token.read().clone())
    }

    pub fn ist_angemeldet(&self, user_id: UserId) -> bool {
        self.sitzungen.contains_key(&user_id)
    }

    /// Erneuert das Token einer Sitzung
    ///
    /// Das neue Token wird erst nach erfolgreichem Speichern sichtbar.
    pub async fn refresh(&self, user_id: UserId) -> AuthResult<SessionToken> {
        let slot = self
            .sitzungen
            .get(&user_id)
            .map(|s| Arc::clone(&*s))
            .ok_or(AuthError::SessionUnbekannt)?;

        let _schreiber = slot.schreiber.lock().await;

        for versuch in 1..=self.policy.max_versuche {
            let neu = self.tokens.issue(user_id);
            match self.repo.put_session(record(&neu)).await {
                Ok(()) => {
                    if !self.ist_aktueller_slot(user_id, &slot) {
                        // Zwischenzeitlich getrennt: nichts wiederbeleben
                        if !self.ist_angemeldet(user_id) {
                            if let Err(e) = self.repo.delete_session(user_id).await {
                                tracing::warn!(
                                    user_id = %user_id,
                                    fehler = %e,
                                    "Sitzung konnte nicht geloescht werden"
                                );
                            }
                        }
                        return Err(AuthError::SessionUnbekannt);
                    }
                    let alt = std::mem::replace(&mut *slot.token.write(), neu.clone());
                    if self.tokens.revocation_enabled() {
                        let mut ersetzt = slot.ersetzt.lock();
                        // Abgelaufene Tokens muessen nicht mehr gesperrt werden
                        ersetzt.retain(|t| t.expires_at_millis > neu.issued_at_millis);
                        ersetzt.push(alt);
                    }
                    tracing::debug!(user_id = %user_id, versuch, "Token erneuert");
                    return Ok(neu);
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        versuch,
                        max = self.policy.max_versuche,
                        fehler = %e,
                        "Token-Erneuerung fehlgeschlagen"
                    );
                    if versuch < self.policy.max_versuche {
                        tokio::time::sleep(self.policy.backoff(versuch)).await;
                    }
                }
            }
        }

        tracing::error!(
            user_id = %user_id,
            versuche = self.policy.max_versuche,
            "Token-Erneuerung aufgegeben, Sitzung verworfen"
        );
        self.sitzungen
            .remove_if(&user_id, |_, s| Arc::ptr_eq(s, &slot));
        if let Err(e) = self.repo.delete_session(user_id).await {
            tracing::warn!(user_id = %user_id, fehler = %e, "Sitzung konnte nicht geloescht werden");
        }

        Err(AuthError::ReauthentifizierungErforderlich {
            versuche: self.policy.max_versuche,
        })
    }

    fn ist_aktueller_slot(&self, user_id: UserId, slot: &Arc<SessionSlot>) -> bool {
        self.sitzungen
            .get(&user_id)
            .is_some_and(|s| Arc::ptr_eq(s.value(), slot))
    }

    /// Startet den periodischen Refresh-Task einer Sitzung
    ///
    /// Der Task endet, sobald die Sitzung verschwindet oder eine Erneuerung
    /// endgueltig scheitert.
    pub fn refresh_task_starten(self: &Arc<Self>, user_id: UserId) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(manager.policy.intervall).await;
                if !manager.ist_angemeldet(user_id) {
                    tracing::debug!(user_id = %user_id, "Refresh-Task beendet (Sitzung getrennt)");
                    break;
                }
                if let Err(e) = manager.refresh(user_id).await {
                    tracing::warn!(user_id = %user_id, fehler = %e, "Refresh-Task beendet");
                    break;
                }
            }
        })
    }

    /// Trennt eine Sitzung
    ///
    /// Entfernt die Buchfuehrung und den gespeicherten Datensatz. Die Tokens
    /// selbst bleiben bis zu ihrem Ablauf gueltig, ausser die Sperrliste
    /// ist aktiv: dann werden das aktuelle und alle durch Refresh ersetzten
    /// Tokens der Sitzung gesperrt. Gibt false zurueck wenn keine Sitzung bestand.
    pub async fn trennen(&self, user_id: UserId) -> AuthResult<bool> {
        let entfernt = self.sitzungen.remove(&user_id);
        if let Some((_, slot)) = &entfernt {
            if self.tokens.revocation_enabled() {
                let jetzt = slot.token.read().clone();
                let ersetzt = std::mem::take(&mut *slot.ersetzt.lock());
                for token in ersetzt.iter().chain(std::iter::once(&jetzt)) {
                    self.tokens.revoke(token.as_str());
                }
            }
        }
        self.repo.delete_session(user_id).await?;

        if entfernt.is_some() {
            tracing::info!(user_id = %user_id, "Sitzung getrennt");
        }
        Ok(entfernt.is_some())
    }

    /// Anzahl der aktiven Sitzungen
    pub fn anzahl_aktive(&self) -> usize {
        self.sitzungen.len()
    }
}

fn record(token: &SessionToken) -> SessionRecord {
    SessionRecord {
        user_id: token.subject,
        token: token.as_str().to_string(),
        issued_at_millis: token.issued_at_millis,
        expires_at_millis: token.expires_at_millis,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tresor_core::ManualClock;
    use tresor_db::{FehlerInjektion, Fehlerpunkt, MemoryDb};

    const T0: i64 = 1_700_000_000_000;

    struct Aufbau {
        manager: Arc<SessionManager>,
        tokens: Arc<TokenService>,
        db: Arc<MemoryDb>,
        uhr: Arc<ManualClock>,
    }

    fn aufbau_mit(tokens: impl FnOnce(TokenService) -> TokenService) -> Aufbau {
        let uhr = Arc::new(ManualClock::neu(T0));
        let tokens = Arc::new(tokens(TokenService::new(b"geheim".to_vec(), uhr.clone())));
        let db = MemoryDb::neu();
        let policy = RefreshPolicy {
            intervall: Duration::from_secs(600),
            max_versuche: 3,
            basis_backoff: Duration::from_millis(100),
        };
        let manager = SessionManager::new(Arc::clone(&tokens), db.clone(), policy);
        Aufbau {
            manager,
            tokens,
            db,
            uhr,
        }
    }

    fn aufbau() -> Aufbau {
        aufbau_mit(|t| t)
    }

    #[test]
    fn backoff_verdoppelt() {
        let p = RefreshPolicy {
            basis_backoff: Duration::from_millis(100),
            ..RefreshPolicy::default()
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(RefreshPolicy::default().max_versuche, 3);
    }

    #[tokio::test]
    async fn anmelden_speichert_sitzung() {
        let a = aufbau();
        let user = UserId::new();
        let token = a.manager.anmelden(user).await.unwrap();

        assert!(a.tokens.verify(token.as_str()));
        assert_eq!(a.manager.aktuelles_token(user), Some(token.clone()));
        let gespeichert = a.db.get_session(user).await.unwrap().unwrap();
        assert_eq!(gespeichert.token, token.as_str());
        assert_eq!(gespeichert.expires_at_millis, T0 + 900_000);
    }

    #[tokio::test]
    async fn refresh_stellt_neues_token_aus() {
        let a = aufbau();
        let user = UserId::new();
        let alt = a.manager.anmelden(user).await.unwrap();

        a.uhr.vorspulen(60_000);
        let neu = a.manager.refresh(user).await.unwrap();

        assert_ne!(alt, neu);
        assert_eq!(neu.issued_at_millis, T0 + 60_000);
        assert_eq!(alt.expires_at_millis, T0 + 900_000, "altes Ablaufdatum unveraendert");
        assert_eq!(a.manager.aktuelles_token(user), Some(neu.clone()));
        assert_eq!(
            a.db.get_session(user).await.unwrap().unwrap().token,
            neu.as_str()
        );
    }

    #[tokio::test]
    async fn refresh_ohne_sitzung() {
        let a = aufbau();
        assert!(matches!(
            a.manager.refresh(UserId::new()).await,
            Err(AuthError::SessionUnbekannt)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_mit_backoff_erfolgreich() {
        let a = aufbau();
        let user = UserId::new();
        let alt = a.manager.anmelden(user).await.unwrap();
        a.uhr.vorspulen(1);

        a.db.fehler_injizieren(Fehlerpunkt::SitzungSchreiben, FehlerInjektion::sofort().mal(2));
        let start = tokio::time::Instant::now();
        let neu = a.manager.refresh(user).await.unwrap();

        // 100 ms + 200 ms Backoff vor dem dritten Versuch
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_ne!(neu, alt);
        assert_eq!(a.manager.aktuelles_token(user), Some(neu));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_gibt_nach_drei_versuchen_auf() {
        let a = aufbau();
        let user = UserId::new();
        let alt = a.manager.anmelden(user).await.unwrap();

        a.db.fehler_injizieren(Fehlerpunkt::SitzungSchreiben, FehlerInjektion::sofort());
        let ergebnis = a.manager.refresh(user).await;

        assert!(matches!(
            ergebnis,
            Err(AuthError::ReauthentifizierungErforderlich { versuche: 3 })
        ));
        assert!(!a.manager.ist_angemeldet(user));
        assert!(a.manager.aktuelles_token(user).is_none());
        assert!(a.db.get_session(user).await.unwrap().is_none());
        // Ohne Sperrliste bleibt das alte Token bis zum Ablauf gueltig
        assert!(a.tokens.verify(alt.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn sichtbares_token_bleibt_waehrend_fehlversuchen_alt() {
        let a = aufbau();
        let user = UserId::new();
        let alt = a.manager.anmelden(user).await.unwrap();
        a.uhr.vorspulen(1);
        a.db.fehler_injizieren(Fehlerpunkt::SitzungSchreiben, FehlerInjektion::sofort().mal(1));

        let manager = Arc::clone(&a.manager);
        let refresh = tokio::spawn(async move { manager.refresh(user).await });

        // Erster Versuch ist gescheitert, Task wartet im Backoff
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(a.manager.aktuelles_token(user), Some(alt.clone()));

        let neu = refresh.await.unwrap().unwrap();
        assert_ne!(neu, alt);
        assert_eq!(a.manager.aktuelles_token(user), Some(neu));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_erneuert_periodisch() {
        let a = aufbau();
        let user = UserId::new();
        let alt = a.manager.anmelden(user).await.unwrap();
        a.uhr.vorspulen(600_000);

        let task = a.manager.refresh_task_starten(user);
        tokio::time::sleep(Duration::from_secs(601)).await;

        let neu = a.manager.aktuelles_token(user).unwrap();
        assert_ne!(neu, alt);
        assert_eq!(neu.issued_at_millis, T0 + 600_000);

        a.manager.trennen(user).await.unwrap();
        tokio::time::sleep(Duration::from_secs(601)).await;
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_endet_nach_endgueltigem_fehler() {
        let a = aufbau();
        let user = UserId::new();
        a.manager.anmelden(user).await.unwrap();
        a.db.fehler_injizieren(Fehlerpunkt::SitzungSchreiben, FehlerInjektion::sofort());

        let task = a.manager.refresh_task_starten(user);
        task.await.unwrap();
        assert!(!a.manager.ist_angemeldet(user));
    }

    #[tokio::test]
    async fn trennen_ohne_sperrliste() {
        let a = aufbau();
        let user = UserId::new();
        let token = a.manager.anmelden(user).await.unwrap();

        assert!(a.manager.trennen(user).await.unwrap());
        assert!(!a.manager.trennen(user).await.unwrap());
        assert!(a.db.get_session(user).await.unwrap().is_none());
        assert_eq!(a.manager.anzahl_aktive(), 0);
        // Zustandsloses Token: bleibt bis zum Ablauf gueltig
        assert!(a.tokens.verify(token.as_str()));
    }

    #[tokio::test]
    async fn trennen_mit_sperrliste() {
        let a = aufbau_mit(TokenService::with_revocation);
        let user = UserId::new();
        let token = a.manager.anmelden(user).await.unwrap();

        a.manager.trennen(user).await.unwrap();
        assert!(!a.tokens.verify(token.as_str()));
    }

    #[tokio::test]
    async fn trennen_mit_sperrliste_sperrt_auch_ersetzte_tokens() {
        let a = aufbau_mit(TokenService::with_revocation);
        let user = UserId::new();
        let erstes = a.manager.anmelden(user).await.unwrap();

        a.uhr.vorspulen(600_000);
        let zweites = a.manager.refresh(user).await.unwrap();
        assert!(a.tokens.verify(erstes.as_str()), "Refresh sperrt nicht sofort");

        a.manager.trennen(user).await.unwrap();
        assert!(!a.tokens.verify(erstes.as_str()));
        assert!(!a.tokens.verify(zweites.as_str()));
    }

    #[tokio::test]
    async fn ersetzte_tokens_ohne_sperrliste_nicht_gemerkt() {
        let a = aufbau();
        let user = UserId::new();
        let erstes = a.manager.anmelden(user).await.unwrap();
        a.uhr.vorspulen(60_000);
        a.manager.refresh(user).await.unwrap();

        a.manager.trennen(user).await.unwrap();
        assert!(a.tokens.verify(erstes.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn trennen_waehrend_refresh_belebt_sitzung_nicht() {
        let a = aufbau();
        let user = UserId::new();
        a.manager.anmelden(user).await.unwrap();
        a.uhr.vorspulen(1);
        a.db.fehler_injizieren(Fehlerpunkt::SitzungSchreiben, FehlerInjektion::sofort().mal(1));

        let manager = Arc::clone(&a.manager);
        let refresh = tokio::spawn(async move { manager.refresh(user).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        a.manager.trennen(user).await.unwrap();
        let ergebnis = refresh.await.unwrap();
        assert!(matches!(ergebnis, Err(AuthError::SessionUnbekannt)));
        assert!(!a.manager.ist_angemeldet(user));
        assert!(a.db.get_session(user).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fehlgeschlagenes_aufraeumen_nach_trennen_bleibt_folgenlos() {
        let a = aufbau();
        let user = UserId::new();
        a.manager.anmelden(user).await.unwrap();
        a.uhr.vorspulen(1);
        a.db.fehler_injizieren(Fehlerpunkt::SitzungSchreiben, FehlerInjektion::sofort().mal(1));

        let manager = Arc::clone(&a.manager);
        let refresh = tokio::spawn(async move { manager.refresh(user).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        a.manager.trennen(user).await.unwrap();
        a.db.fehler_injizieren(Fehlerpunkt::SitzungLoeschen, FehlerInjektion::sofort());
        let ergebnis = refresh.await.unwrap();

        // Loeschfehler wird nur protokolliert, die Sitzung bleibt getrennt
        assert!(matches!(ergebnis, Err(AuthError::SessionUnbekannt)));
        assert!(!a.manager.ist_angemeldet(user));
    }
}
