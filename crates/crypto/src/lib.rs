//! # tresor-crypto
//!
//! Kryptografie-Kern fuer Tresor.
//!
//! ## Module
//! - `cipher` - AES-128 (eigene Implementierung), PKCS#7, Counter-Modus
//! - `aead` - Authentifizierte Verschluesselung mit Polynom-Hash-Tag
//! - `keywrap` - RSA-Umschlag fuer den 16-Byte Gruppen-Schluessel
//! - `e2e` - Gruppen-Schluessel und Nachrichten-Verschluesselung
//! - `types` - Gemeinsame Typen (RawGroupKey, RoundKeySchedule, Umschlaege)
//! - `error` - Fehlertypen

pub mod aead;
pub mod cipher;
pub mod e2e;
pub mod error;
pub mod keywrap;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use keywrap::{
    generate_keypair, generate_keypair_with_bits, unwrap_key, wrap_key, RsaKeyPair,
    RsaPrivateKey, RsaPublicKey,
};
pub use types::{RawGroupKey, RoundKeySchedule, SealedMessage, SecretBytes, WrappedKeyEnvelope};

pub use e2e::{
    create_group_key, decrypt_message, encrypt_message, reencrypt_message, unwrap_key_for_member,
    wrap_key_for_member, MessageIdentity,
};
