//! Archive header parsing for all three version families (`spec.md` §3,
//! §6).

use crate::error::{Error, Result};
use crate::version::Version;
use bitflags::bitflags;

const MAGIC: u16 = 0x5844; // "DX"

bitflags! {
    /// Archive-level behaviour flags (V8 only; V6/V5 behave as if unset).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// XOR cipher is disabled for this archive.
        const NO_KEY = 0x1;
        /// The header region is not Huffman+LZ compressed.
        const NO_HEAD_PRESS = 0x2;
    }
}

/// The parsed, version-normalised archive header.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: Version,
    /// The raw `version` field as it appears on disk. `version` buckets
    /// this into a header family; some behavior (see
    /// `crate::version::xor_offset_threaded`) is gated on the raw number
    /// instead, so both are kept.
    pub raw_version: u16,
    pub head_size: u64,
    pub data_start: u64,
    pub name_table_start: u64,
    pub file_table_start: u64,
    pub dir_table_start: u64,
    pub flags: Flags,
    pub huffman_encode_kb: u8,
}

impl Header {
    /// Parses the header at the start of `bytes`. `bytes` must be the
    /// whole archive (the header's region may extend past its own fixed
    /// size, but the fixed-size prefix is all this function reads).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::BadMagic);
        }
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }

        let raw_version = u16::from_le_bytes([bytes[2], bytes[3]]);
        let version = Version::from_raw(raw_version).ok_or(Error::UnsupportedVersion(raw_version))?;

        if bytes.len() < version.header_len() {
            return Err(Error::HeaderSizeInvalid {
                expected: version.header_len() as u64,
                actual: bytes.len() as u64,
            });
        }

        let mut r = FieldReader::new(&bytes[4..]);
        let head_size = u64::from(r.u32()?);
        let data_start = r.u64()?;
        let name_table_start = r.u64()?;
        let file_table_start = r.u64()?;
        let dir_table_start = r.u64()?;

        // V8's `charCodeFormat` is a packed 4-byte `I`; V6/V5's is an
        // 8-byte `Q` (Python native-struct alignment puts it on an
        // 8-byte boundary since there's no trailing `flags`/`huffman`
        // tail to share the word with). Neither value is used past
        // this point, so the width only matters for cursor alignment.
        let (flags, huffman_encode_kb) = if version.header_compressed() {
            let _char_code = r.u32()?;
            let flags = Flags::from_bits_truncate(r.u32()?);
            let huffman_encode_kb = r.u8()?;
            (flags, huffman_encode_kb)
        } else {
            let _char_code = r.u64()?;
            (Flags::empty(), 0xFF)
        };

        if head_size == 0 {
            return Err(Error::HeaderSizeInvalid {
                expected: 1,
                actual: 0,
            });
        }

        Ok(Header {
            version,
            raw_version,
            head_size,
            data_start,
            name_table_start,
            file_table_start,
            dir_table_start,
            flags,
            huffman_encode_kb,
        })
    }
}

/// A tiny little-endian cursor, local to header parsing since nothing
/// downstream needs the full generality of a `Source`/`Sink` abstraction
/// for a read-only, single-pass header.
struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + n).ok_or(Error::TruncatedStream)?;
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }
}
