//! Gruppen-Schluessel pro Chat
//!
//! Jeder Chat hat genau einen aktuellen 16-Byte AES-Schluessel. Jedes Mitglied
//! erhaelt ihn als eigenen RSA-Umschlag, markiert mit der Schluessel-Version.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::CryptoResult;
use crate::keywrap::{unwrap_key, wrap_key, RsaPrivateKey, RsaPublicKey};
use crate::types::{RawGroupKey, WrappedKeyEnvelope, KEY_LEN};

/// Erstellt einen neuen zufaelligen Gruppen-Schluessel
pub fn create_group_key() -> RawGroupKey {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    let key = RawGroupKey::from_array(bytes);
    bytes.zeroize();
    key
}

/// Verpackt den Gruppen-Schluessel fuer ein Mitglied
pub fn wrap_key_for_member(
    key: &RawGroupKey,
    key_version: u64,
    member_key: &RsaPublicKey,
) -> CryptoResult<WrappedKeyEnvelope> {
    let ciphertext = wrap_key(key.as_bytes(), member_key)?;
    Ok(WrappedKeyEnvelope {
        key_version,
        ciphertext,
    })
}

/// Entpackt den Umschlag eines Mitglieds
///
/// Der Inhalt muss exakt 16 Bytes lang sein.
pub fn unwrap_key_for_member(
    envelope: &WrappedKeyEnvelope,
    member_key: &RsaPrivateKey,
) -> CryptoResult<RawGroupKey> {
    let bytes = unwrap_key(&envelope.ciphertext, member_key)?;
    RawGroupKey::from_slice(bytes.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
