//! Counter-Modus (Stromchiffre aus AES)

use rand::rngs::OsRng;
use rand::RngCore;

use super::block::encrypt_block;
use crate::types::{RoundKeySchedule, BLOCK_LEN, IV_LEN};

/// Erzeugt einen zufaelligen 12-Byte IV aus dem Betriebssystem-CSPRNG
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Startwert des Zaehlers: `IV || 00 00 00 00`
pub fn initial_counter_block(iv: &[u8; IV_LEN]) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    block[..IV_LEN].copy_from_slice(iv);
    block
}

/// XOR mit dem Schluesselstrom; identisch fuer Ver- und Entschluesselung
pub fn ctr_transform(data: &[u8], schedule: &RoundKeySchedule, iv: &[u8; IV_LEN]) -> Vec<u8> {
    let mut counter = initial_counter_block(iv);
    let mut out = Vec::with_capacity(data.len());

    for chunk in data.chunks(BLOCK_LEN) {
        let keystream = encrypt_block(&counter, schedule);
        out.extend(chunk.iter().zip(keystream.iter()).map(|(d, k)| d ^ k));
        increment(&mut counter);
    }
    out
}

/// 128-Bit Big-Endian Inkrement mit Uebertrag nach links
fn increment(counter: &mut [u8; BLOCK_LEN]) {
    for byte in counter.iter_mut().rev() {
        let (neu, ueberlauf) = byte.overflowing_add(1);
        *byte = neu;
        if !ueberlauf {
            break;
        }
    }
}
