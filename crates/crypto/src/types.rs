//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::block::derive_schedule;
use crate::error::{CryptoError, CryptoResult};

/// Laenge eines AES-128-Schluessels bzw. Gruppen-Schluessels in Bytes
pub const KEY_LEN: usize = 16;
/// Blockgroesse von AES in Bytes
pub const BLOCK_LEN: usize = 16;
/// Laenge des Counter-IV in Bytes
pub const IV_LEN: usize = 12;
/// Laenge des AEAD-Tags in Bytes
pub const TAG_LEN: usize = 16;
/// Anzahl der Rundenschluessel bei AES-128
pub const ROUND_KEYS: usize = 11;

/// Sicherer Byte-Container (wird beim Drop genullt)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Roher 16-Byte Gruppen-Schluessel eines Chats
///
/// Existiert nur kurzzeitig im Speicher waehrend einer Schluessel-Operation.
/// Im Ruhezustand liegt er ausschliesslich in Form von [`WrappedKeyEnvelope`]s
/// vor. Der Puffer wird beim Drop genullt.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RawGroupKey([u8; KEY_LEN]);

impl RawGroupKey {
    pub fn from_array(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Uebernimmt einen Schluessel aus einem Slice (Laenge muss exakt 16 sein)
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: KEY_LEN,
                    erhalten: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Leitet den Rundenschluessel-Plan ab (wird nie persistiert)
    pub fn schedule(&self) -> RoundKeySchedule {
        derive_schedule(&self.0)
    }
}

impl PartialEq for RawGroupKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for RawGroupKey {}

impl std::fmt::Debug for RawGroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RawGroupKey([REDACTED])")
    }
}

/// Die 11 Rundenschluessel von AES-128
///
/// Wird bei Bedarf aus dem rohen Schluessel neu berechnet und danach
/// verworfen. Beim Drop genullt.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RoundKeySchedule(pub(crate) [[u8; BLOCK_LEN]; ROUND_KEYS]);

impl RoundKeySchedule {
    /// Rundenschluessel `round` (0 = Master-Schluessel)
    pub fn round_key(&self, round: usize) -> &[u8; BLOCK_LEN] {
        &self.0[round]
    }
}

impl PartialEq for RoundKeySchedule {
    fn eq(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(subtle::Choice::from(1), |acc, (a, b)| acc & a.ct_eq(b))
            .into()
    }
}

impl Eq for RoundKeySchedule {}

impl std::fmt::Debug for RoundKeySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RoundKeySchedule([REDACTED])")
    }
}

/// Mit dem RSA-Schluessel eines Mitglieds verpackter Gruppen-Schluessel
///
/// Pro (Chat, Mitglied) existiert genau ein Umschlag, markiert mit der
/// Schluessel-Version, die er enthaelt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyEnvelope {
    pub key_version: u64,
    pub ciphertext: Vec<u8>,
}

/// Verschluesselte Nachricht im Byte-Format `IV(12) || Ciphertext || Tag(16)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl SealedMessage {
    /// Serialisiert zu Bytes: [iv(12)] + [ciphertext] + [tag(16)]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Deserialisiert aus Bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::UngueltigeDaten(format!(
                "Chiffrat zu kurz: {} Bytes (Minimum: {})",
                bytes.len(),
                IV_LEN + TAG_LEN
            )));
        }
        let (iv, rest) = bytes.split_at(IV_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

        let mut iv_arr = [0u8; IV_LEN];
        iv_arr.copy_from_slice(iv);
        let mut tag_arr = [0u8; TAG_LEN];
        tag_arr.copy_from_slice(tag);

        Ok(Self {
            iv: iv_arr,
            ciphertext: ciphertext.to_vec(),
            tag: tag_arr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_key_falsche_laenge() {
        let ergebnis = RawGroupKey::from_slice(&[0u8; 15]);
        assert_eq!(
            ergebnis,
            Err(CryptoError::UngueltigeSchluesselLaenge {
                erwartet: 16,
                erhalten: 15
            })
        );
    }

    #[test]
    fn debug_verraet_keine_schluessel() {
        let key = RawGroupKey::from_array([0xAB; 16]);
        let ausgabe = format!("{key:?} {:?}", key.schedule());
        assert!(!ausgabe.to_lowercase().contains("ab"));
    }

    #[test]
    fn sealed_message_layout() {
        let msg = SealedMessage {
            iv: [1; 12],
            ciphertext: vec![2; 5],
            tag: [3; 16],
        };
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), 33);
        assert_eq!(&bytes[..12], &[1; 12]);
        assert_eq!(&bytes[12..17], &[2; 5]);
        assert_eq!(&bytes[17..], &[3; 16]);
        assert_eq!(SealedMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn sealed_message_zu_kurz() {
        assert!(matches!(
            SealedMessage::from_bytes(&[0u8; 27]),
            Err(CryptoError::UngueltigeDaten(_))
        ));
    }
}
