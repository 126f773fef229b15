//! Name table resolution: turning a file entry's `name_offset` into a
//! path component, with the Shift-JIS fallback the format needs for
//! Japanese-language archives (`spec.md` §4.6.2).
//!
//! There are two distinct readers of the name table, and they read
//! differently: the display path goes through an extra `*4+4` indirection
//! (`original_source/DXArchive.py`'s `getOriginalFileName`), while the
//! per-file key string tail reads the name directly four bytes past the
//! offset (`createKeyFileString`). Conflating them yields a correct-looking
//! but wrong-keyed extraction, so they stay as separate functions.

use crate::error::{Error, Result};
use encoding_rs::SHIFT_JIS;

/// Resolves the display name for the entry whose `name_offset` is `o`.
///
/// `name_table[o]` is read as a byte `p`; the actual name bytes start at
/// `o + p*4 + 4` (relative to `o`, not to the start of the table) and run
/// to the next NUL.
pub fn resolve(name_table: &[u8], name_offset: usize) -> Result<String> {
    let prefix = *name_table.get(name_offset).ok_or(Error::TruncatedStream)? as usize;
    let start = name_offset + prefix * 4 + 4;
    decode_at(name_table, start)
}

/// Returns the raw (un-decoded) name bytes used to build a per-file key
/// string: the bytes starting 4 past `name_offset`, up to the next NUL.
/// Unlike `resolve`, key derivation operates on raw bytes directly, with
/// no `*4` indirection and no charset decoding.
pub fn raw_key_bytes(name_table: &[u8], name_offset: usize) -> Result<&[u8]> {
    let slice = name_table.get(name_offset + 4..).ok_or(Error::TruncatedStream)?;
    let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    Ok(&slice[..end])
}

/// Decodes the NUL-terminated name starting at absolute byte offset
/// `start`, UTF-8 first, Shift-JIS (`cp932`) on failure.
fn decode_at(name_table: &[u8], start: usize) -> Result<String> {
    let slice = name_table.get(start..).ok_or(Error::TruncatedStream)?;
    let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    let raw = &slice[..end];

    if let Ok(s) = std::str::from_utf8(raw) {
        return Ok(s.to_owned());
    }

    let (decoded, _, had_errors) = SHIFT_JIS.decode(raw);
    if had_errors {
        return Err(Error::NameDecodeError);
    }
    Ok(decoded.into_owned())
}
