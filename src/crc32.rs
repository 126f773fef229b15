//! The reflected CRC-32 used by the archive's key derivation (C1).
//!
//! Polynomial `0xEDB88320`, initial value `0xFFFFFFFF`, final xor
//! `0xFFFFFFFF`. This is the same construction as `zlib`'s `crc32`, but the
//! archive format computes it over small, irregular byte spans (the even
//! and odd bytes of a key string) so it's simplest to own the table here
//! rather than pull in a crate.

use std::sync::OnceLock;

const POLY: u32 = 0xEDB8_8320;

#[must_use]
const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut word = i as u32;
        let mut j = 0;
        while j < 8 {
            word = if word & 1 != 0 {
                (word >> 1) ^ POLY
            } else {
                word >> 1
            };
            j += 1;
        }
        table[i] = word;
        i += 1;
    }
    table
}

fn table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Computes the CRC-32 of `data`.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    let table = table();
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = table[index] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}
