//! Unit-Tests fuer den GroupKeyManager

use std::sync::Arc;

use tresor_core::{ChatId, UserId};
use tresor_crypto::WrappedKeyEnvelope;
use tresor_db::{ChatRecord, ChatRepository, ChatStore, KeyDirectory, NO_KEY};

use super::umgebung::{Umgebung, TEST_PRIME_BITS};
use crate::error::ChatError;
use crate::key_manager::GroupKeyManager;
use crate::types::GrantErgebnis;

async fn leerer_chat(env: &Umgebung, ersteller: UserId) -> ChatId {
    let chat_id = ChatId::new();
    env.db
        .create_chat(ChatRecord {
            id: chat_id,
            name: "roh".into(),
            creator_id: ersteller,
            key_version: NO_KEY,
            created_at_millis: 0,
        })
        .await
        .unwrap();
    env.db.add_member(chat_id, ersteller).await.unwrap();
    chat_id
}

#[tokio::test]
async fn test_erster_schluessel_hat_version_eins() {
    let env = Umgebung::neu().await;
    let ersteller = env.benutzer().await;
    let chat_id = leerer_chat(&env, ersteller).await;

    let version = env.schluessel.create_key(chat_id, ersteller).await.unwrap();
    assert_eq!(version, 1);

    let chat = env.db.get_chat(chat_id).await.unwrap().unwrap();
    assert_eq!(chat.key_version, 1);
    assert_eq!(env.umschlag(chat_id, ersteller).await.unwrap().key_version, 1);
}

#[tokio::test]
async fn test_zweiter_schluessel_abgelehnt() {
    let env = Umgebung::neu().await;
    let ersteller = env.benutzer().await;
    let chat_id = leerer_chat(&env, ersteller).await;
    env.schluessel.create_key(chat_id, ersteller).await.unwrap();

    let result = env.schluessel.create_key(chat_id, ersteller).await;
    assert!(matches!(result, Err(ChatError::SchluesselExistiert(id)) if id == chat_id));
}

#[tokio::test]
async fn test_schluessel_nur_fuer_mitglieder() {
    let env = Umgebung::neu().await;
    let ersteller = env.benutzer().await;
    let fremder = env.benutzer().await;
    let chat_id = leerer_chat(&env, ersteller).await;

    let result = env.schluessel.create_key(chat_id, fremder).await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
}

#[tokio::test]
async fn test_unbekannter_chat() {
    let env = Umgebung::neu().await;
    let user = env.benutzer().await;

    let result = env.schluessel.current_key(ChatId::new(), user).await;
    assert!(matches!(result, Err(ChatError::ChatNichtGefunden(_))));
}

#[tokio::test]
async fn test_chat_ohne_schluessel() {
    let env = Umgebung::neu().await;
    let ersteller = env.benutzer().await;
    let chat_id = leerer_chat(&env, ersteller).await;

    let result = env.schluessel.current_key(chat_id, ersteller).await;
    assert!(matches!(result, Err(ChatError::KeinSchluessel(_))));
}

#[tokio::test]
async fn test_aktueller_schluessel_gleich_fuer_alle_mitglieder() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(2).await;

    let (v_a, plan_a) = env.schluessel.current_key(chat_id, ersteller).await.unwrap();
    let (v_b, plan_b) = env.schluessel.current_key(chat_id, mitglieder[0]).await.unwrap();
    let (v_c, plan_c) = env.schluessel.current_key(chat_id, mitglieder[1]).await.unwrap();

    assert_eq!((v_a, v_b, v_c), (1, 1, 1));
    assert_eq!(plan_a, plan_b);
    assert_eq!(plan_b, plan_c);
}

#[tokio::test]
async fn test_fremder_erhaelt_keinen_schluessel() {
    let env = Umgebung::neu().await;
    let (chat_id, _, _) = env.chat_mit_mitgliedern(0).await;
    let fremder = env.benutzer().await;

    let result = env.schluessel.current_key(chat_id, fremder).await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
}

#[tokio::test]
async fn test_einladung_nur_durch_mitglied() {
    let env = Umgebung::neu().await;
    let (chat_id, _, _) = env.chat_mit_mitgliedern(0).await;
    let fremder = env.benutzer().await;
    let gast = env.benutzer().await;

    let result = env.schluessel.wrap_for_invite(chat_id, fremder, gast).await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
}

#[tokio::test]
async fn test_einladungs_umschlag_enthaelt_aktuellen_schluessel() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let gast = env.benutzer().await;

    let umschlag = env
        .schluessel
        .wrap_for_invite(chat_id, ersteller, gast)
        .await
        .unwrap();
    assert_eq!(umschlag.key_version, 1);

    let privat = env.privater_schluessel(gast).await;
    let schluessel = tresor_crypto::unwrap_key_for_member(&umschlag, &privat).unwrap();
    assert_eq!(schluessel, env.roher_schluessel(chat_id, ersteller).await);
}

#[tokio::test]
async fn test_umschlag_aus_der_zukunft_abgelehnt() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let gast = env.benutzer().await;

    let mut umschlag = env
        .schluessel
        .wrap_for_invite(chat_id, ersteller, gast)
        .await
        .unwrap();
    umschlag.key_version = 7;

    let result = env.schluessel.grant_member(chat_id, gast, &umschlag).await;
    assert!(matches!(
        result,
        Err(ChatError::VersionKonflikt {
            erwartet: 1,
            gefunden: 7
        })
    ));
    assert!(env.umschlag(chat_id, gast).await.is_none());
}

#[tokio::test]
async fn test_passender_umschlag_wird_uebernommen() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let gast = env.benutzer().await;

    let umschlag = env
        .schluessel
        .wrap_for_invite(chat_id, ersteller, gast)
        .await
        .unwrap();
    let ergebnis = env
        .schluessel
        .grant_member(chat_id, gast, &umschlag)
        .await
        .unwrap();

    assert_eq!(ergebnis, GrantErgebnis::Uebernommen { version: 1 });
    assert_eq!(env.umschlag(chat_id, gast).await, Some(umschlag));
}

#[tokio::test]
async fn test_rotation_ohne_mitglieder_aendert_nichts() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    env.db.remove_member(chat_id, ersteller).await.unwrap();

    let version = env.schluessel.rotate_key(chat_id).await.unwrap();
    assert_eq!(version, 1);
    assert!(!env.schluessel.rotation_ausstehend(chat_id).await.unwrap());
}

#[tokio::test]
async fn test_rotation_erhoeht_version_und_tauscht_schluessel() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(1).await;
    let alt = env.roher_schluessel(chat_id, ersteller).await;

    let version = env.schluessel.rotate_key(chat_id).await.unwrap();
    assert_eq!(version, 2);

    let neu_a = env.roher_schluessel(chat_id, ersteller).await;
    let neu_b = env.roher_schluessel(chat_id, mitglieder[0]).await;
    assert_eq!(neu_a, neu_b);
    assert_ne!(neu_a, alt);
    assert_eq!(env.umschlag(chat_id, mitglieder[0]).await.unwrap().key_version, 2);
}

#[tokio::test]
async fn test_resume_ohne_journal_liefert_aktuelle_version() {
    let env = Umgebung::neu().await;
    let (chat_id, _, _) = env.chat_mit_mitgliedern(1).await;

    assert_eq!(env.schluessel.resume_rotation(chat_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_verwahrungs_schluessel_wird_wiederverwendet() {
    let env = Umgebung::neu().await;
    let erster = env.db.get_custody_keys().await.unwrap().expect("abgelegt");

    let store: Arc<dyn ChatStore> = env.db.clone();
    GroupKeyManager::laden_oder_erzeugen(store, env.clock.clone(), TEST_PRIME_BITS)
        .await
        .unwrap();

    let zweiter = env.db.get_custody_keys().await.unwrap().expect("abgelegt");
    assert_eq!(erster, zweiter);
}

#[tokio::test]
async fn test_sperre_serialisiert_zugriffe() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;

    let sperre = env.schluessel.sperren(chat_id).await;
    assert_eq!(sperre.chat_id(), chat_id);

    let schluessel = env.schluessel.clone();
    let wartend =
        tokio::spawn(async move { schluessel.current_key(chat_id, ersteller).await.map(|(v, _)| v) });

    tokio::task::yield_now().await;
    assert!(!wartend.is_finished(), "Zugriff muss auf die Sperre warten");

    drop(sperre);
    assert_eq!(wartend.await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn test_sperr_tabelle_wird_aufgeraeumt() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(2).await;
    env.nachrichten_senden(chat_id, &[ersteller], 3).await;
    env.service
        .mitglied_entfernen(chat_id, ersteller, mitglieder[1])
        .await
        .unwrap();
    assert_eq!(env.schluessel.anzahl_sperren(), 0);

    // Eintrag bleibt, solange noch jemand auf die Sperre wartet
    let sperre = env.schluessel.sperren(chat_id).await;
    let schluessel = env.schluessel.clone();
    let wartend = tokio::spawn(async move { schluessel.current_key(chat_id, ersteller).await });
    tokio::task::yield_now().await;

    drop(sperre);
    assert_eq!(env.schluessel.anzahl_sperren(), 1);
    assert_eq!(wartend.await.unwrap().unwrap().0, 2);
    assert_eq!(env.schluessel.anzahl_sperren(), 0);
}

#[tokio::test]
async fn test_andere_chats_nicht_blockiert() {
    let env = Umgebung::neu().await;
    let (chat_1, _, _) = env.chat_mit_mitgliedern(0).await;
    let (chat_2, ersteller_2, _) = env.chat_mit_mitgliedern(0).await;

    let _sperre = env.schluessel.sperren(chat_1).await;
    let (version, _) = env.schluessel.current_key(chat_2, ersteller_2).await.unwrap();
    assert_eq!(version, 1);
}

#[tokio::test]
async fn test_grant_fuer_unregistrierten_benutzer_bei_veraltetem_umschlag() {
    let env = Umgebung::neu().await;
    let (chat_id, _, _) = env.chat_mit_mitgliedern(1).await;
    env.schluessel.rotate_key(chat_id).await.unwrap();

    let veraltet = WrappedKeyEnvelope {
        key_version: 1,
        ciphertext: vec![1, 2, 3],
    };
    let result = env.schluessel.grant_member(chat_id, UserId::new(), &veraltet).await;
    assert!(matches!(
        result,
        Err(ChatError::Datenbank(tresor_db::DbError::NichtGefunden(_)))
    ));
}
