//! PKCS#7-Padding auf AES-Blockgroesse

use crate::error::{CryptoError, CryptoResult};
use crate::types::BLOCK_LEN;

/// Fuellt auf das naechste Vielfache von 16 auf (immer 1..=16 Bytes)
pub fn pad(data: &[u8]) -> Vec<u8> {
    let n = BLOCK_LEN - data.len() % BLOCK_LEN;
    let mut out = Vec::with_capacity(data.len() + n);
    out.extend_from_slice(data);
    out.resize(data.len() + n, n as u8);
    out
}

/// Entfernt PKCS#7-Padding
///
/// Jede Abweichung liefert [`CryptoError::InvalidPadding`] ohne Detail.
pub fn unpad(data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::InvalidPadding);
    }

    let n = data[data.len() - 1] as usize;
    if n == 0 || n > BLOCK_LEN {
        return Err(CryptoError::InvalidPadding);
    }

    let (inhalt, fuellung) = data.split_at(data.len() - n);
    if fuellung.iter().any(|&b| b as usize != n) {
        return Err(CryptoError::InvalidPadding);
    }

    Ok(inhalt.to_vec())
}
