//! AES-128: Schluessel-Expansion und Einzelblock-Operationen
//!
//! Der Zustand ist spaltenweise angeordnet (Byte `i` liegt in Zeile `i % 4`,
//! Spalte `i / 4`), wie in FIPS-197.

use super::tables::{INV_SBOX, RCON, SBOX};
use crate::types::{RoundKeySchedule, BLOCK_LEN, KEY_LEN, ROUND_KEYS};

type Block = [u8; BLOCK_LEN];

/// Multiplikation in GF(2^8) mit Reduktionspolynom x^8 + x^4 + x^3 + x + 1
pub fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut p = 0u8;
    for _ in 0..8 {
        // Maske statt Verzweigung: 0xFF wenn das Bit gesetzt ist
        p ^= a & 0u8.wrapping_sub(b & 1);
        let carry = a >> 7;
        a <<= 1;
        a ^= 0x1B & 0u8.wrapping_sub(carry);
        b >>= 1;
    }
    p
}

/// Leitet die 11 Rundenschluessel aus einem 16-Byte Master-Schluessel ab
///
/// Arbeitet direkt auf 16-Byte-Zeilen statt auf 4-Byte-Woertern; das
/// Ergebnis ist bitgenau die Standard-Expansion von AES-128.
pub fn derive_schedule(master_key: &[u8; KEY_LEN]) -> RoundKeySchedule {
    let mut rk = [[0u8; BLOCK_LEN]; ROUND_KEYS];
    rk[0] = *master_key;

    for round in 1..ROUND_KEYS {
        let prev = rk[round - 1];

        // RotWord + SubWord + Rcon auf dem letzten Wort der Vorrunde
        let mut word = [prev[13], prev[14], prev[15], prev[12]];
        for b in word.iter_mut() {
            *b = SBOX[*b as usize];
        }
        word[0] ^= RCON[round - 1];

        let mut next = [0u8; BLOCK_LEN];
        for i in 0..BLOCK_LEN {
            next[i] = prev[i] ^ word[i % 4];
            if i % 4 == 3 {
                word.copy_from_slice(&next[i - 3..=i]);
            }
        }
        rk[round] = next;
    }

    RoundKeySchedule(rk)
}

/// Verschluesselt einen einzelnen 16-Byte-Block
pub fn encrypt_block(input: &[u8; BLOCK_LEN], schedule: &RoundKeySchedule) -> [u8; BLOCK_LEN] {
    let mut state = *input;
    add_round_key(&mut state, schedule.round_key(0));

    for round in 1..10 {
        sub_bytes(&mut state);
        shift_rows(&mut state);
        mix_columns(&mut state);
        add_round_key(&mut state, schedule.round_key(round));
    }

    sub_bytes(&mut state);
    shift_rows(&mut state);
    add_round_key(&mut state, schedule.round_key(10));
    state
}

/// Entschluesselt einen einzelnen 16-Byte-Block
///
/// AddRoundKey steht in jeder inneren Runde vor InvMixColumns.
pub fn decrypt_block(input: &[u8; BLOCK_LEN], schedule: &RoundKeySchedule) -> [u8; BLOCK_LEN] {
    let mut state = *input;
    add_round_key(&mut state, schedule.round_key(10));

    for round in (1..10).rev() {
        inv_shift_rows(&mut state);
        inv_sub_bytes(&mut state);
        add_round_key(&mut state, schedule.round_key(round));
        inv_mix_columns(&mut state);
    }

    inv_shift_rows(&mut state);
    inv_sub_bytes(&mut state);
    add_round_key(&mut state, schedule.round_key(0));
    state
}

fn add_round_key(state: &mut Block, round_key: &Block) {
    for (s, k) in state.iter_mut().zip(round_key) {
        *s ^= k;
    }
}

fn sub_bytes(state: &mut Block) {
    for b in state.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

fn inv_sub_bytes(state: &mut Block) {
    for b in state.iter_mut() {
        *b = INV_SBOX[*b as usize];
    }
}

/// Zeile `r` rotiert um `r` Positionen nach links
fn shift_rows(state: &mut Block) {
    let alt = *state;
    for row in 1..4 {
        for col in 0..4 {
            state[row + 4 * col] = alt[row + 4 * ((col + row) % 4)];
        }
    }
}

fn inv_shift_rows(state: &mut Block) {
    let alt = *state;
    for row in 1..4 {
        for col in 0..4 {
            state[row + 4 * ((col + row) % 4)] = alt[row + 4 * col];
        }
    }
}

fn mix_columns(state: &mut Block) {
    for col in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [col[0], col[1], col[2], col[3]];
        col[0] = gf_mul(a0, 2) ^ gf_mul(a1, 3) ^ a2 ^ a3;
        col[1] = a0 ^ gf_mul(a1, 2) ^ gf_mul(a2, 3) ^ a3;
        col[2] = a0 ^ a1 ^ gf_mul(a2, 2) ^ gf_mul(a3, 3);
        col[3] = gf_mul(a0, 3) ^ a1 ^ a2 ^ gf_mul(a3, 2);
    }
}

fn inv_mix_columns(state: &mut Block) {
    for col in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [col[0], col[1], col[2], col[3]];
        col[0] = gf_mul(a0, 14) ^ gf_mul(a1, 11) ^ gf_mul(a2, 13) ^ gf_mul(a3, 9);
        col[1] = gf_mul(a0, 9) ^ gf_mul(a1, 14) ^ gf_mul(a2, 11) ^ gf_mul(a3, 13);
        col[2] = gf_mul(a0, 13) ^ gf_mul(a1, 9) ^ gf_mul(a2, 14) ^ gf_mul(a3, 11);
        col[3] = gf_mul(a0, 11) ^ gf_mul(a1, 13) ^ gf_mul(a2, 9) ^ gf_mul(a3, 14);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
