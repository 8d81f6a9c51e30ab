//! HMAC-SHA-256 (RFC 2104)

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const BLOCK_LEN: usize = 64;
const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5C;

/// Laenge einer Signatur in Bytes
pub const MAC_LEN: usize = 32;

/// Berechnet `H(K ^ opad || H(K ^ ipad || message))`
///
/// Schluessel laenger als ein Block werden vorher gehasht.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; MAC_LEN] {
    let mut block_key = Zeroizing::new([0u8; BLOCK_LEN]);
    if key.len() > BLOCK_LEN {
        block_key[..MAC_LEN].copy_from_slice(&Sha256::digest(key));
    } else {
        block_key[..key.len()].copy_from_slice(key);
    }

    let mut inner_pad = Zeroizing::new([0u8; BLOCK_LEN]);
    let mut outer_pad = Zeroizing::new([0u8; BLOCK_LEN]);
    for i in 0..BLOCK_LEN {
        inner_pad[i] = block_key[i] ^ IPAD;
        outer_pad[i] = block_key[i] ^ OPAD;
    }

    let inner = Sha256::new()
        .chain_update(inner_pad.as_slice())
        .chain_update(message)
        .finalize();

    Sha256::new()
        .chain_update(outer_pad.as_slice())
        .chain_update(inner)
        .finalize()
        .into()
}
