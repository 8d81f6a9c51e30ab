//! Authentifizierte Verschluesselung (AEAD)
//!
//! Counter-Modus fuer die Vertraulichkeit, ein Polynom-Hash ueber
//! GF(2^128) fuer die Integritaet.
//!
//! ## Format
//! ```text
//! [iv(12)] [ciphertext(n)] [tag(16)]
//! ```
//!
//! ## Tag
//! ```text
//! H  = E(0^128)
//! Y0 = IV || 00000000          (identisch mit dem ersten Zaehlerblock)
//! Y  = (Y ^ block) * H         fuer pad(aad), pad(ct), [bitlen(aad) | bitlen(ct)]
//! ```

use subtle::ConstantTimeEq;

use crate::cipher::{ctr_transform, encrypt_block, generate_iv, initial_counter_block, pad};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{RoundKeySchedule, SealedMessage, BLOCK_LEN, IV_LEN, TAG_LEN};

/// Verschluesselt `plaintext` und bindet `aad`
///
/// Gibt `IV || Ciphertext || Tag` zurueck. Der IV ist pro Aufruf frisch.
pub fn seal(plaintext: &[u8], aad: &[u8], schedule: &RoundKeySchedule) -> Vec<u8> {
    let iv = generate_iv();
    let ciphertext = ctr_transform(plaintext, schedule, &iv);
    let tag = compute_tag(&iv, aad, &ciphertext, schedule);

    SealedMessage {
        iv,
        ciphertext,
        tag,
    }
    .to_bytes()
}

/// Prueft den Tag und entschluesselt
///
/// Bei falschem Tag wird kein Klartext freigegeben.
pub fn open(blob: &[u8], aad: &[u8], schedule: &RoundKeySchedule) -> CryptoResult<Vec<u8>> {
    let sealed = SealedMessage::from_bytes(blob)?;
    let erwartet = compute_tag(&sealed.iv, aad, &sealed.ciphertext, schedule);

    if !bool::from(erwartet.ct_eq(&sealed.tag)) {
        return Err(CryptoError::AuthenticationFailure);
    }

    Ok(ctr_transform(&sealed.ciphertext, schedule, &sealed.iv))
}

/// Berechnet den 16-Byte Tag ueber AAD und Ciphertext
pub fn compute_tag(
    iv: &[u8; IV_LEN],
    aad: &[u8],
    ciphertext: &[u8],
    schedule: &RoundKeySchedule,
) -> [u8; TAG_LEN] {
    let h = encrypt_block(&[0u8; BLOCK_LEN], schedule);
    let mut y = initial_counter_block(iv);

    let aad_gepolstert = pad(aad);
    let ct_gepolstert = pad(ciphertext);

    let mut laengen = [0u8; BLOCK_LEN];
    laengen[..8].copy_from_slice(&bitlaenge(aad).to_be_bytes());
    laengen[8..].copy_from_slice(&bitlaenge(ciphertext).to_be_bytes());

    let bloecke = aad_gepolstert
        .chunks_exact(BLOCK_LEN)
        .chain(ct_gepolstert.chunks_exact(BLOCK_LEN))
        .chain(std::iter::once(&laengen[..]));

    for block in bloecke {
        for (y_byte, b) in y.iter_mut().zip(block) {
            *y_byte ^= b;
        }
        y = gf128_mul(&y, &h);
    }

    y
}

fn bitlaenge(data: &[u8]) -> u64 {
    (data.len() as u64).wrapping_mul(8)
}

/// Multiplikation in GF(2^128) modulo x^128 + x^7 + x^2 + x + 1
///
/// Bloecke werden als Big-Endian 128-Bit Ganzzahlen gelesen. Die Bitauswahl
/// erfolgt ueber Masken, nicht ueber Verzweigungen.
pub fn gf128_mul(a: &[u8; BLOCK_LEN], b: &[u8; BLOCK_LEN]) -> [u8; BLOCK_LEN] {
    let mut a = u128::from_be_bytes(*a);
    let mut b = u128::from_be_bytes(*b);
    let mut z = 0u128;

    for _ in 0..128 {
        z ^= a & 0u128.wrapping_sub(b & 1);
        let carry = a >> 127;
        a <<= 1;
        a ^= 0x87 & 0u128.wrapping_sub(carry);
        b >>= 1;
    }

    z.to_be_bytes()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
