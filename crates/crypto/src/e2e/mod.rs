//! E2E Verschluesselung (End-to-End)
//!
//! Der Klartext einer Nachricht existiert nur bei Sender und Empfaengern.
//! Gespeichert werden ausschliesslich Chiffrate und RSA-Umschlaege.
//!
//! ## Ablauf
//! 1. Chat-Erstellung: neuer Gruppen-Schluessel (Version 1), Umschlag fuer den Ersteller
//! 2. Einladung: Umschlag fuer den Eingeladenen mit der aktuellen Version
//! 3. Senden/Lesen: AEAD mit dem Rundenschluessel-Plan, AAD = Nachrichten-Identitaet
//! 4. Mitglied entfernt: neue Version, neue Umschlaege, Verlauf umschluesseln

pub mod decrypt;
pub mod encrypt;
pub mod group_key;

pub use decrypt::decrypt_message;
pub use encrypt::{encrypt_message, reencrypt_message, MessageIdentity};
pub use group_key::{create_group_key, unwrap_key_for_member, wrap_key_for_member};
