//! Nachrichten-Entschluesselung
//!
//! Verifiziert den Tag gegen die AAD der Nachrichten-Identitaet, bevor
//! Klartext freigegeben wird.

use crate::aead::open;
use crate::e2e::encrypt::MessageIdentity;
use crate::error::CryptoResult;
use crate::types::RoundKeySchedule;

/// Entschluesselt eine gespeicherte Nachricht
///
/// Verifiziert automatisch:
/// - Auth-Tag (AEAD-Integritaet)
/// - AAD (Chat, Zeitstempel und Nachrichten-ID muessen uebereinstimmen)
pub fn decrypt_message(
    blob: &[u8],
    identity: &MessageIdentity,
    schedule: &RoundKeySchedule,
) -> CryptoResult<Vec<u8>> {
    open(blob, &identity.aad(), schedule)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
