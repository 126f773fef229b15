//! Key derivation (C2): turns a user key string into a fixed-width XOR
//! keystream seed. The archive format has two unrelated schemes depending
//! on version: a CRC-32-based 7-byte key (V8, and the "new" V6), and a
//! 12-byte bit-scramble (V5, and the "legacy" V6 reader).

use crate::crc32::crc32;

/// Default key string used when the caller supplies none, or when the
/// supplied key is too short. Despite the name this spells `DXBDXARC\0`,
/// not `DXLIBARC` -- the original tool's constant name doesn't match its
/// bytes.
pub const DEFAULT_KEY_STRING: &[u8; 9] = b"DXBDXARC\0";

/// Width of a V8 / new-V6 keystream, in bytes.
pub const CRC_KEY_BYTES: usize = 7;

/// Width of a V5 / legacy-V6 keystream, in bytes.
pub const SCRAMBLE_KEY_BYTES: usize = 12;

/// Max length of a user-supplied key string before derivation truncates
/// it (`DXA_KEY_STRING_LENGTH` in `DXArchive.py`).
pub(crate) const KEY_STRING_LEN: usize = 63;

/// Derives the 7-byte CRC-32-based key used by V8 archives and the
/// CRC-keyed V6 reader.
///
/// If `key_string` is shorter than 4 bytes, the default key string is
/// appended before derivation (this also covers the empty-string case).
/// The even-indexed and odd-indexed bytes of the (possibly extended)
/// string are each hashed with CRC-32 independently; the key is the
/// little-endian bytes of the first hash followed by the low 3 bytes of
/// the second.
#[must_use]
pub fn derive_crc_key(key_string: &[u8]) -> [u8; CRC_KEY_BYTES] {
    let mut extended;
    let source: &[u8] = if key_string.len() < 4 {
        extended = Vec::with_capacity(key_string.len() + DEFAULT_KEY_STRING.len());
        extended.extend_from_slice(key_string);
        extended.extend_from_slice(DEFAULT_KEY_STRING);
        &extended
    } else {
        key_string
    };

    let even: Vec<u8> = source.iter().step_by(2).copied().collect();
    let odd: Vec<u8> = source.iter().skip(1).step_by(2).copied().collect();

    let c0 = crc32(&even);
    let c1 = crc32(&odd);

    let c0 = c0.to_le_bytes();
    let c1 = c1.to_le_bytes();
    [c0[0], c0[1], c0[2], c0[3], c1[0], c1[1], c1[2]]
}

/// Derives the 12-byte scrambled key used by V5 archives and the legacy
/// V6 reader.
///
/// An empty `key_string` seeds every byte with `0xAA` before scrambling
/// (the original tool literally fills the buffer with the 32-bit pattern
/// `0xAAAAAAAA` truncated to a byte, which is just `0xAA`). Otherwise the
/// key string is repeated (tiled) to fill 12 bytes. A fixed bijective
/// scramble (bitwise NOT, nibble swap, xor with fixed constants) is then
/// applied to specific byte slots.
#[must_use]
pub fn derive_scramble_key(key_string: &[u8]) -> [u8; SCRAMBLE_KEY_BYTES] {
    let mut key = [0u8; SCRAMBLE_KEY_BYTES];

    if key_string.is_empty() {
        key.fill(0xAA);
    } else {
        for (i, slot) in key.iter_mut().enumerate() {
            *slot = key_string[i % key_string.len()];
        }
    }

    key[0] = !key[0];
    key[1] = key[1].rotate_left(4);
    key[2] ^= 0x8A;
    key[3] = !key[3].rotate_left(4);
    key[4] = !key[4];
    key[5] ^= 0xAC;
    key[6] = !key[6];
    key[7] = !key[7].rotate_left(5);
    key[8] = key[8].rotate_left(3);
    key[9] ^= 0x7F;
    key[10] = key[10].rotate_left(4) ^ 0xD6;
    key[11] ^= 0xCC;

    key
}
