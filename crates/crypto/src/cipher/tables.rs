//! Lookup-Tabellen fuer AES
//!
//! Die S-Box wird zur Compilezeit aus der multiplikativen Inversen in
//! GF(2^8) und der affinen Abbildung berechnet; die inverse S-Box ist ihre
//! Umkehrtabelle.

/// Rundenkonstanten fuer Runde 1..=10 (Index 0 entspricht Runde 1)
pub const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1B, 0x36];

pub const SBOX: [u8; 256] = make_sbox();
pub const INV_SBOX: [u8; 256] = make_inv_sbox(&SBOX);

/// Multiplikation in GF(2^8) (const-Variante fuer den Tabellenaufbau)
const fn gf_mul_const(mut a: u8, mut b: u8) -> u8 {
    let mut p = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            p ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1B;
        }
        b >>= 1;
    }
    p
}

/// a^254 = a^-1 in GF(2^8); 0 bildet auf 0 ab
const fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp != 0 {
        if exp & 1 != 0 {
            result = gf_mul_const(result, base);
        }
        base = gf_mul_const(base, base);
        exp >>= 1;
    }
    if a == 0 {
        0
    } else {
        result
    }
}

const fn affine(x: u8) -> u8 {
    x ^ x.rotate_left(1) ^ x.rotate_left(2) ^ x.rotate_left(3) ^ x.rotate_left(4) ^ 0x63
}

const fn make_sbox() -> [u8; 256] {
    let mut s = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        s[i] = affine(gf_inv(i as u8));
        i += 1;
    }
    s
}

const fn make_inv_sbox(sbox: &[u8; 256]) -> [u8; 256] {
    let mut inv = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        inv[sbox[i] as usize] = i as u8;
        i += 1;
    }
    inv
}
