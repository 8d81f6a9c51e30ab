//! Nachrichten-Verschluesselung
//!
//! Verschluesselt Chat-Nachrichten mit dem aktuellen Gruppen-Schluessel.
//!
//! ## AAD
//! ```text
//! "<chat_id>:<timestamp_millis>:<message_id>"
//! ```
//! Bindet das Chiffrat an seinen Platz; ein verschobenes Chiffrat
//! besteht die Tag-Pruefung nicht.

use serde::{Deserialize, Serialize};
use tresor_core::{ChatId, MessageId};

use crate::aead::seal;
use crate::e2e::decrypt::decrypt_message;
use crate::error::CryptoResult;
use crate::types::RoundKeySchedule;

/// Unveraenderliche Identitaet einer gespeicherten Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIdentity {
    pub chat_id: ChatId,
    pub timestamp_millis: i64,
    pub message_id: MessageId,
}

impl MessageIdentity {
    pub fn new(chat_id: ChatId, timestamp_millis: i64, message_id: MessageId) -> Self {
        Self {
            chat_id,
            timestamp_millis,
            message_id,
        }
    }

    /// AAD-Bytes fuer jede AEAD-Operation auf diesem Datensatz
    pub fn aad(&self) -> Vec<u8> {
        format!(
            "{}:{}:{}",
            self.chat_id, self.timestamp_millis, self.message_id
        )
        .into_bytes()
    }
}

/// Verschluesselt eine Nachricht
///
/// Ergebnis: `IV(12) || Ciphertext || Tag(16)`
pub fn encrypt_message(
    plaintext: &[u8],
    identity: &MessageIdentity,
    schedule: &RoundKeySchedule,
) -> Vec<u8> {
    seal(plaintext, &identity.aad(), schedule)
}

/// Entschluesselt mit dem alten und verschluesselt mit dem neuen Schluessel
///
/// Die AAD bleibt unveraendert. Der Klartext existiert nur innerhalb
/// dieses Aufrufs.
pub fn reencrypt_message(
    blob: &[u8],
    identity: &MessageIdentity,
    old: &RoundKeySchedule,
    new: &RoundKeySchedule,
) -> CryptoResult<Vec<u8>> {
    let klartext = zeroize::Zeroizing::new(decrypt_message(blob, identity, old)?);
    Ok(encrypt_message(&klartext, identity, new))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e2e::group_key::create_group_key;
    use crate::error::CryptoError;
    use uuid::Uuid;

    fn identitaet() -> MessageIdentity {
        MessageIdentity::new(ChatId(Uuid::nil()), 1_700_000_000_000, MessageId(Uuid::nil()))
    }

    #[test]
    fn aad_format() {
        assert_eq!(
            identitaet().aad(),
            b"00000000-0000-0000-0000-000000000000:1700000000000:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn encrypt_erzeugt_iv_ct_tag() {
        let key = create_group_key();
        let blob = encrypt_message(b"Hallo", &identitaet(), &key.schedule());
        assert_eq!(blob.len(), 12 + 5 + 16);
    }

    #[test]
    fn reencrypt_wechselt_schluessel() {
        let alt = create_group_key().schedule();
        let neu = create_group_key().schedule();
        let id = identitaet();

        let blob = encrypt_message(b"Verlauf", &id, &alt);
        let umgeschluesselt = reencrypt_message(&blob, &id, &alt, &neu).unwrap();

        assert_eq!(decrypt_message(&umgeschluesselt, &id, &neu).unwrap(), b"Verlauf");
        assert_eq!(
            decrypt_message(&umgeschluesselt, &id, &alt),
            Err(CryptoError::AuthenticationFailure)
        );
    }

    #[test]
    fn reencrypt_mit_falschem_altschluessel() {
        let id = identitaet();
        let blob = encrypt_message(b"x", &id, &create_group_key().schedule());
        let ergebnis = reencrypt_message(
            &blob,
            &id,
            &create_group_key().schedule(),
            &create_group_key().schedule(),
        );
        assert_eq!(ergebnis, Err(CryptoError::AuthenticationFailure));
    }
}
