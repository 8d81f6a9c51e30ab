//! AES-128 Blockchiffre und Counter-Mode
//!
//! - `tables`: S-Box, inverse S-Box und Rundenkonstanten
//! - `block`: Schluessel-Expansion und Block-Ver-/Entschluesselung
//! - `padding`: PKCS#7 bei Blockgroesse 16
//! - `ctr`: Stromchiffre ueber einen 128-Bit Big-Endian Zaehler

pub mod block;
pub mod ctr;
pub mod padding;
pub mod tables;

pub use block::{decrypt_block, derive_schedule, encrypt_block, gf_mul};
pub use ctr::{ctr_transform, generate_iv, initial_counter_block};
pub use padding::{pad, unpad};
