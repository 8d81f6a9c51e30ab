//! Unit-Tests fuer den ChatService

use tresor_core::{Ablehnung, InviteId, ServiceError, UserId};
use tresor_crypto::CryptoError;
use tresor_db::{ChatRepository, DbError, InviteRepository, MessageRepository};

use super::umgebung::Umgebung;
use crate::error::ChatError;
use crate::types::{GrantErgebnis, MAX_NACHRICHT_BYTES};

#[tokio::test]
async fn test_chat_erstellen_erfolgreich() {
    let env = Umgebung::neu().await;
    let ersteller = env.benutzer().await;

    let chat = env
        .service
        .chat_erstellen(ersteller, "  Projekt Tresor  ")
        .await
        .expect("Chat erstellen fehlgeschlagen");

    assert_eq!(chat.name, "Projekt Tresor");
    assert_eq!(chat.creator_id, ersteller);
    assert_eq!(chat.key_version, 1);
    assert_eq!(
        env.service.mitglieder_auflisten(chat.id, ersteller).await.unwrap(),
        vec![ersteller]
    );
}

#[tokio::test]
async fn test_leerer_chat_name_abgelehnt() {
    let env = Umgebung::neu().await;
    let ersteller = env.benutzer().await;

    let result = env.service.chat_erstellen(ersteller, "   ").await;
    assert!(matches!(result, Err(ChatError::UngueltigeEingabe(_))));
}

#[tokio::test]
async fn test_zu_langer_chat_name_abgelehnt() {
    let env = Umgebung::neu().await;
    let ersteller = env.benutzer().await;

    let result = env.service.chat_erstellen(ersteller, &"x".repeat(129)).await;
    assert!(matches!(result, Err(ChatError::UngueltigeEingabe(_))));
}

#[tokio::test]
async fn test_unregistrierter_ersteller_abgelehnt() {
    let env = Umgebung::neu().await;

    let result = env.service.chat_erstellen(UserId::new(), "Chat").await;
    assert!(matches!(
        result,
        Err(ChatError::Datenbank(DbError::NichtGefunden(_)))
    ));
}

#[tokio::test]
async fn test_nachricht_senden_und_lesen() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(1).await;

    env.clock.vorspulen(5);
    let quittung = env
        .service
        .nachricht_senden(chat_id, ersteller, "Hallo Welt!".as_bytes())
        .await
        .expect("Nachricht senden fehlgeschlagen");
    assert_eq!(quittung.chat_id, chat_id);
    assert_eq!(quittung.key_version, 1);

    let history = env.service.history_laden(chat_id, mitglieder[0]).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].inhalt, b"Hallo Welt!");
    assert_eq!(history[0].sender_id, ersteller);
    assert_eq!(history[0].message_id, quittung.message_id);
    assert_eq!(history[0].timestamp_millis, quittung.timestamp_millis);
}

#[tokio::test]
async fn test_gespeichert_wird_nur_chiffrat() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let klartext = b"streng geheimer Inhalt";

    env.service
        .nachricht_senden(chat_id, ersteller, klartext)
        .await
        .unwrap();

    let records = env.db.get_messages_for_chat(chat_id).await.unwrap();
    assert_eq!(records.len(), 1);
    let blob = &records[0].ciphertext;
    assert_eq!(blob.len(), 12 + klartext.len() + 16);
    assert!(!blob.windows(klartext.len()).any(|w| w == klartext));
}

#[tokio::test]
async fn test_history_chronologisch() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(1).await;
    let gesendet = env
        .nachrichten_senden(chat_id, &[ersteller, mitglieder[0]], 5)
        .await;

    let history = env.service.history_laden(chat_id, ersteller).await.unwrap();
    let texte: Vec<String> = history
        .iter()
        .map(|n| String::from_utf8(n.inhalt.clone()).unwrap())
        .collect();
    assert_eq!(texte, gesendet);
    assert_eq!(history[1].sender_id, mitglieder[0]);
}

#[tokio::test]
async fn test_leere_nachricht_abgelehnt() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;

    let result = env.service.nachricht_senden(chat_id, ersteller, b"").await;
    assert!(matches!(result, Err(ChatError::UngueltigeEingabe(_))));
}

#[tokio::test]
async fn test_zu_lange_nachricht_abgelehnt() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;

    let zu_lang = vec![b'a'; MAX_NACHRICHT_BYTES + 1];
    let result = env.service.nachricht_senden(chat_id, ersteller, &zu_lang).await;
    assert!(matches!(result, Err(ChatError::UngueltigeEingabe(_))));
}

#[tokio::test]
async fn test_fremder_darf_nicht_senden() {
    let env = Umgebung::neu().await;
    let (chat_id, _, _) = env.chat_mit_mitgliedern(0).await;
    let fremder = env.benutzer().await;

    let result = env.service.nachricht_senden(chat_id, fremder, b"Hallo").await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));

    let result = env.service.history_laden(chat_id, fremder).await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
}

#[tokio::test]
async fn test_manipuliertes_chiffrat_erkannt() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    env.nachrichten_senden(chat_id, &[ersteller], 1).await;

    let record = env.db.get_messages_for_chat(chat_id).await.unwrap().remove(0);
    let mut kaputt = record.ciphertext.clone();
    kaputt[14] ^= 0x01;
    env.db
        .update_message_ciphertext(record.message_id, kaputt, record.key_version)
        .await
        .unwrap();

    let result = env.service.history_laden(chat_id, ersteller).await;
    assert!(matches!(
        result,
        Err(ChatError::Crypto(CryptoError::AuthenticationFailure))
    ));
}

#[tokio::test]
async fn test_vertauschte_chiffrate_erkannt() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    env.nachrichten_senden(chat_id, &[ersteller], 2).await;

    let records = env.db.get_messages_for_chat(chat_id).await.unwrap();
    env.db
        .update_message_ciphertext(records[0].message_id, records[1].ciphertext.clone(), 1)
        .await
        .unwrap();

    let result = env.service.history_laden(chat_id, ersteller).await;
    assert!(matches!(
        result,
        Err(ChatError::Crypto(CryptoError::AuthenticationFailure))
    ));
}

#[tokio::test]
async fn test_nachricht_mit_falscher_version_ist_stoerung() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    env.nachrichten_senden(chat_id, &[ersteller], 1).await;

    let record = env.db.get_messages_for_chat(chat_id).await.unwrap().remove(0);
    env.db
        .update_message_ciphertext(record.message_id, record.ciphertext, 9)
        .await
        .unwrap();

    let result = env.service.history_laden(chat_id, ersteller).await;
    let fehler = result.expect_err("Versionskonflikt erwartet");
    assert!(matches!(
        fehler,
        ChatError::VersionKonflikt {
            erwartet: 1,
            gefunden: 9
        }
    ));
    assert!(matches!(fehler.klassifizieren(), ServiceError::Fault(_)));
}

#[tokio::test]
async fn test_einladung_annehmen() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let gast = env.benutzer().await;

    let einladung = env
        .service
        .einladung_erstellen(chat_id, ersteller, gast)
        .await
        .unwrap();
    assert_eq!(einladung.invitee_id, gast);
    assert!(!env.db.is_member(chat_id, gast).await.unwrap());

    let ergebnis = env.service.einladung_annehmen(einladung.id, gast).await.unwrap();
    assert_eq!(ergebnis, GrantErgebnis::Uebernommen { version: 1 });
    assert!(env.db.is_member(chat_id, gast).await.unwrap());
    assert!(env.db.get_invite(einladung.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_einladung_nur_fuer_eingeladenen() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let gast = env.benutzer().await;
    let dritter = env.benutzer().await;

    let einladung = env
        .service
        .einladung_erstellen(chat_id, ersteller, gast)
        .await
        .unwrap();

    let result = env.service.einladung_annehmen(einladung.id, dritter).await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
    assert!(!env.db.is_member(chat_id, dritter).await.unwrap());
}

#[tokio::test]
async fn test_einladung_nur_einmal_annehmbar() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let gast = env.benutzer().await;

    let einladung = env
        .service
        .einladung_erstellen(chat_id, ersteller, gast)
        .await
        .unwrap();
    env.service.einladung_annehmen(einladung.id, gast).await.unwrap();

    let result = env.service.einladung_annehmen(einladung.id, gast).await;
    assert!(matches!(result, Err(ChatError::EinladungNichtGefunden(_))));
}

#[tokio::test]
async fn test_unbekannte_einladung() {
    let env = Umgebung::neu().await;
    let user = env.benutzer().await;

    let result = env.service.einladung_annehmen(InviteId::new(), user).await;
    assert!(matches!(result, Err(ChatError::EinladungNichtGefunden(_))));
}

#[tokio::test]
async fn test_ungueltige_einladungen() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(1).await;

    let selbst = env.service.einladung_erstellen(chat_id, ersteller, ersteller).await;
    assert!(matches!(selbst, Err(ChatError::UngueltigeEingabe(_))));

    let doppelt = env
        .service
        .einladung_erstellen(chat_id, ersteller, mitglieder[0])
        .await;
    assert!(matches!(doppelt, Err(ChatError::UngueltigeEingabe(_))));

    let unregistriert = env
        .service
        .einladung_erstellen(chat_id, ersteller, UserId::new())
        .await;
    assert!(matches!(
        unregistriert,
        Err(ChatError::Datenbank(DbError::NichtGefunden(_)))
    ));
}

#[tokio::test]
async fn test_nur_ersteller_darf_andere_entfernen() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(2).await;

    let result = env
        .service
        .mitglied_entfernen(chat_id, mitglieder[0], mitglieder[1])
        .await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
    assert!(env.db.is_member(chat_id, mitglieder[1]).await.unwrap());

    let version = env
        .service
        .mitglied_entfernen(chat_id, ersteller, mitglieder[1])
        .await
        .unwrap();
    assert_eq!(version, 2);
}

#[tokio::test]
async fn test_ausgetretener_ersteller_darf_nicht_entfernen() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(2).await;

    assert_eq!(env.service.verlassen(chat_id, ersteller).await.unwrap(), 2);

    let result = env
        .service
        .mitglied_entfernen(chat_id, ersteller, mitglieder[0])
        .await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
    assert!(env.db.is_member(chat_id, mitglieder[0]).await.unwrap());
    assert_eq!(
        env.db.get_chat(chat_id).await.unwrap().unwrap().key_version,
        2,
        "keine weitere Rotation"
    );

    // Selbst austreten bleibt moeglich
    assert_eq!(env.service.verlassen(chat_id, mitglieder[1]).await.unwrap(), 3);
}

#[tokio::test]
async fn test_entfernen_eines_nicht_mitglieds() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, _) = env.chat_mit_mitgliedern(0).await;
    let fremder = env.benutzer().await;

    let result = env.service.mitglied_entfernen(chat_id, ersteller, fremder).await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
    assert_eq!(
        env.db.get_chat(chat_id).await.unwrap().unwrap().key_version,
        1
    );
}

#[tokio::test]
async fn test_verlassen_sperrt_aus() {
    let env = Umgebung::neu().await;
    let (chat_id, ersteller, mitglieder) = env.chat_mit_mitgliedern(1).await;
    env.nachrichten_senden(chat_id, &[ersteller], 2).await;

    let version = env.service.verlassen(chat_id, mitglieder[0]).await.unwrap();
    assert_eq!(version, 2);

    let result = env.service.nachricht_senden(chat_id, mitglieder[0], b"noch da?").await;
    assert!(matches!(result, Err(ChatError::MembershipViolation(_))));
    assert_eq!(env.service.history_laden(chat_id, ersteller).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_klassifizierung_an_der_grenze() {
    let env = Umgebung::neu().await;
    let (chat_id, _, _) = env.chat_mit_mitgliedern(0).await;
    let fremder = env.benutzer().await;

    let fehler: ServiceError = env
        .service
        .history_laden(chat_id, fremder)
        .await
        .expect_err("Fremder darf nicht lesen")
        .into();
    assert!(matches!(
        fehler,
        ServiceError::Rejected(Ablehnung::MembershipViolation(_))
    ));
}
