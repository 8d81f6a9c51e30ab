//! RSA-Umschlag fuer Gruppen-Schluessel
//!
//! Transportiert ausschliesslich den 16-Byte Gruppen-Schluessel zwischen
//! der Verwahrung auf dem Server und dem Schluesselpaar eines Mitglieds.
//! Nie fuer Nachrichten-Inhalte verwenden.
//!
//! ## Format
//! ```text
//! m = [padding(16, erstes Byte != 0)] [schluessel]
//! c = m^e mod N
//! ```

use num_bigint_dig::{BigInt, BigUint, ModInverse, RandPrime, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// Anzahl zufaelliger Padding-Bytes vor dem Schluessel
pub const WRAP_PADDING_LEN: usize = 16;
/// Standard-Primzahlgroesse (Modulus damit ca. 2048 Bit)
pub const DEFAULT_PRIME_BITS: usize = 1024;
/// Untergrenze, damit ein gepolsterter 16-Byte Schluessel sicher passt
pub const MIN_PRIME_BITS: usize = 160;

const STANDARD_EXPONENT: u32 = 65_537;

/// Oeffentlicher Schluessel `{e, N}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    e: BigUint,
    n: BigUint,
}

impl RsaPublicKey {
    /// Big-Endian Bytes von `(e, N)` fuer die Ablage
    pub fn to_parts(&self) -> (Vec<u8>, Vec<u8>) {
        (self.e.to_bytes_be(), self.n.to_bytes_be())
    }

    pub fn from_parts(e: &[u8], n: &[u8]) -> CryptoResult<Self> {
        let e = BigUint::from_bytes_be(e);
        let n = BigUint::from_bytes_be(n);
        if e.is_zero() || n <= BigUint::one() {
            return Err(CryptoError::UngueltigeDaten(
                "Oeffentlicher Schluessel unvollstaendig".into(),
            ));
        }
        Ok(Self { e, n })
    }

    /// Bitlaenge des Modulus
    pub fn modulus_bits(&self) -> usize {
        self.n.bits()
    }
}

/// Privater Schluessel `{d, N}`; `d` wird beim Drop genullt
#[derive(Clone)]
pub struct RsaPrivateKey {
    d: BigUint,
    n: BigUint,
}

impl RsaPrivateKey {
    /// `(d, N)` als Big-Endian Bytes; `d` bleibt in einem genullten Puffer
    pub fn to_parts(&self) -> (SecretBytes, Vec<u8>) {
        (SecretBytes::new(self.d.to_bytes_be()), self.n.to_bytes_be())
    }

    pub fn from_parts(d: &[u8], n: &[u8]) -> CryptoResult<Self> {
        let d = BigUint::from_bytes_be(d);
        let n = BigUint::from_bytes_be(n);
        if d.is_zero() || n <= BigUint::one() {
            return Err(CryptoError::UngueltigeDaten(
                "Privater Schluessel unvollstaendig".into(),
            ));
        }
        Ok(Self { d, n })
    }
}

impl Drop for RsaPrivateKey {
    fn drop(&mut self) {
        self.d.zeroize();
    }
}

impl std::fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("d", &"[REDACTED]")
            .field("n_bits", &self.n.bits())
            .finish()
    }
}

/// Schluesselpaar eines Benutzers
#[derive(Debug, Clone)]
pub struct RsaKeyPair {
    pub public: RsaPublicKey,
    pub private: RsaPrivateKey,
}

/// Erzeugt ein Schluesselpaar mit zwei 1024-Bit Primzahlen
pub fn generate_keypair() -> CryptoResult<RsaKeyPair> {
    generate_keypair_with_bits(DEFAULT_PRIME_BITS)
}

/// Erzeugt ein Schluesselpaar mit konfigurierbarer Primzahlgroesse
pub fn generate_keypair_with_bits(prime_bits: usize) -> CryptoResult<RsaKeyPair> {
    if prime_bits < MIN_PRIME_BITS {
        return Err(CryptoError::SchluesselGenerierung(format!(
            "Primzahlgroesse {prime_bits} Bit unter Minimum {MIN_PRIME_BITS}"
        )));
    }

    let mut rng = OsRng;
    let p: BigUint = rng.gen_prime(prime_bits);
    let mut q: BigUint = rng.gen_prime(prime_bits);
    while q == p {
        q = rng.gen_prime(prime_bits);
    }

    let n = &p * &q;
    let phi = (&p - BigUint::one()) * (&q - BigUint::one());
    let e = oeffentlicher_exponent(&phi);
    let d = private_exponent(&e, &phi)?;

    tracing::debug!(modulus_bits = n.bits(), "RSA-Schluesselpaar erzeugt");

    Ok(RsaKeyPair {
        public: RsaPublicKey { e, n: n.clone() },
        private: RsaPrivateKey { d, n },
    })
}

/// 65537 wenn teilerfremd zu phi, sonst der kleinste passende ungerade Wert ab 3
fn oeffentlicher_exponent(phi: &BigUint) -> BigUint {
    let standard = BigUint::from(STANDARD_EXPONENT);
    if standard.gcd(phi).is_one() {
        return standard;
    }

    let zwei = BigUint::from(2u32);
    let mut e = BigUint::from(3u32);
    while !e.gcd(phi).is_one() {
        e += &zwei;
    }
    e
}

fn private_exponent(e: &BigUint, phi: &BigUint) -> CryptoResult<BigUint> {
    let inverse: BigInt = e.clone().mod_inverse(phi).ok_or_else(|| {
        CryptoError::SchluesselGenerierung("Exponent nicht invertierbar".into())
    })?;

    let phi_signed = BigInt::from_biguint(Sign::Plus, phi.clone());
    inverse
        .mod_floor(&phi_signed)
        .to_biguint()
        .ok_or_else(|| CryptoError::SchluesselGenerierung("negativer privater Exponent".into()))
}

/// Verpackt Schluessel-Bytes fuer einen Empfaenger
pub fn wrap_key(raw: &[u8], public: &RsaPublicKey) -> CryptoResult<Vec<u8>> {
    let mut repraesentant = Zeroizing::new(vec![0u8; WRAP_PADDING_LEN + raw.len()]);
    OsRng.fill_bytes(&mut repraesentant[..WRAP_PADDING_LEN]);
    // Fuehrendes Null-Byte wuerde beim Auspacken verloren gehen
    while repraesentant[0] == 0 {
        repraesentant[0] = OsRng.next_u32() as u8;
    }
    repraesentant[WRAP_PADDING_LEN..].copy_from_slice(raw);

    let mut m = BigUint::from_bytes_be(&repraesentant);
    if m >= public.n {
        m.zeroize();
        return Err(CryptoError::KeyTooLarge);
    }

    let c = m.modpow(&public.e, &public.n);
    m.zeroize();
    Ok(c.to_bytes_be())
}

/// Entpackt einen Umschlag mit dem privaten Schluessel
pub fn unwrap_key(ciphertext: &[u8], private: &RsaPrivateKey) -> CryptoResult<SecretBytes> {
    let c = BigUint::from_bytes_be(ciphertext);
    if c >= private.n {
        return Err(CryptoError::UngueltigeDaten(
            "Umschlag nicht kleiner als der Modulus".into(),
        ));
    }

    let mut m = c.modpow(&private.d, &private.n);
    let repraesentant = Zeroizing::new(m.to_bytes_be());
    m.zeroize();

    if repraesentant.len() <= WRAP_PADDING_LEN {
        return Err(CryptoError::UngueltigeDaten(
            "Umschlag enthaelt keinen Schluessel".into(),
        ));
    }

    Ok(SecretBytes::new(repraesentant[WRAP_PADDING_LEN..].to_vec()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
