//! The top-level archive handle: opens a DXA file, normalizes its header
//! across the three version families, walks its directory tree into
//! `ExtractPlan`s, and extracts individual files on demand.

pub mod header;
pub mod payload;
pub mod walker;

use crate::error::{Error, Result};
use crate::huffman;
use crate::key;
use crate::lz;
use crate::version::{self, Version};
use crate::xor;
use header::{Flags, Header};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub use walker::ExtractPlan;

/// An opened, memory-mapped DXA archive.
///
/// Holding the `Mmap` alongside the parsed plans means an `Archive` is
/// self-contained: `extract` never re-opens or re-reads the file.
pub struct Archive {
    mmap: Mmap,
    header: Header,
    plans: Vec<ExtractPlan>,
}

impl Archive {
    /// Opens `path`, decodes its header and directory tables, and returns
    /// the archive ready for extraction.
    ///
    /// `key_string` is the archive's key string (`DXArchive.py`'s
    /// `keyString_` parameter); pass [`crate::key::DEFAULT_KEY_STRING`]
    /// for archives built with DXLib's default.
    pub fn open(path: impl AsRef<Path>, key_string: &[u8]) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is only ever read; the caller is trusted not
        // to truncate or rewrite the file out from under us for the
        // lifetime of the `Archive`, same assumption the teacher's own
        // `MappedSource` makes.
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let key_string = &key_string[..key_string.len().min(key::KEY_STRING_LEN)];

        let header = Self::parse_header(&mmap, key_string)?;
        let region = Self::decode_header_region(&mmap, &header, key_string)?;

        let file_table = region.get(header.file_table_start as usize..).ok_or(Error::TruncatedStream)?;
        let dir_table = region.get(header.dir_table_start as usize..).ok_or(Error::TruncatedStream)?;
        let plans = walker::walk(&region, file_table, dir_table, &header, key_string)?;

        Ok(Self { mmap, header, plans })
    }

    /// The archive's normalized header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Every leaf file this archive contains, in directory-walk order.
    #[must_use]
    pub fn plans(&self) -> &[ExtractPlan] {
        &self.plans
    }

    /// Extracts `plan`'s file and returns its decoded bytes.
    pub fn extract(&self, plan: &ExtractPlan) -> Result<Vec<u8>> {
        payload::extract(&self.mmap, plan, version::xor_offset_threaded(self.header.raw_version))
    }

    /// Extracts `plan`'s file into `out` instead of allocating a buffer.
    pub fn extract_into(&self, plan: &ExtractPlan, out: &mut impl Write) -> Result<()> {
        payload::extract_into(&self.mmap, plan, version::xor_offset_threaded(self.header.raw_version), out)
    }

    /// Parses the fixed-size header, trying V8's plaintext layout first
    /// and falling back to V6/V5's scramble-encrypted layout.
    ///
    /// V8 stores `DARC_HEAD` in the clear (`DXArchive.py`'s
    /// `decodeArchive` reads it straight off disk, no XOR). V6/V5 XOR the
    /// whole header struct -- magic and version fields included -- with
    /// the archive's scramble key at position 0 before any of it is
    /// interpretable (`DXArchive6.py`: `head = self.keyConvFileRead(None,
    /// len(DARC_HEAD()), self.fp, key, 0)`). There's no way to read a
    /// magic number before decryption to dispatch on, so this tries the
    /// unencrypted reading first and falls back to decrypting only if
    /// that didn't yield a V8 header.
    fn parse_header(mmap: &[u8], key_string: &[u8]) -> Result<Header> {
        if let Ok(header) = Header::parse(mmap) {
            if header.version == Version::V8 {
                return Ok(header);
            }
        }

        let scramble_key = key::derive_scramble_key(key_string);
        let header_len = Version::V6.header_len();
        let mut decrypted = mmap.get(..header_len).ok_or(Error::TruncatedStream)?.to_vec();
        xor::xor_apply(&mut decrypted, 0, &scramble_key);
        Header::parse(&decrypted)
    }

    /// Reads and decodes the name/file/directory table region.
    ///
    /// V8's region is Huffman-then-LZ compressed (unless `NO_HEAD_PRESS`
    /// is set) and spans from `name_table_start` to the end of the file;
    /// V6/V5's is always a raw, XOR-only region exactly `head_size` bytes
    /// long. Both are read starting at `name_table_start`, not `0` --
    /// this absolute file offset is itself the "address zero" that
    /// `file_table_start`/`dir_table_start` are relative to.
    fn decode_header_region(mmap: &[u8], header: &Header, key_string: &[u8]) -> Result<Vec<u8>> {
        let no_key = header.flags.contains(Flags::NO_KEY);

        if header.version == Version::V8 {
            let key = if no_key { None } else { Some(key::derive_crc_key(key_string)) };

            if header.flags.contains(Flags::NO_HEAD_PRESS) {
                let mut region = Self::slice_region(mmap, header.name_table_start, header.head_size)?;
                if let Some(key) = &key {
                    xor::xor_apply(&mut region, 0, key);
                }
                return Ok(region);
            }

            let mut huff_region = mmap.get(header.name_table_start as usize..).ok_or(Error::TruncatedStream)?.to_vec();
            if let Some(key) = &key {
                xor::xor_apply(&mut huff_region, 0, key);
            }
            let lz_stream = huffman::decode(&huff_region)?;
            let region = lz::decode(&lz_stream)?;
            if region.len() as u64 != header.head_size {
                return Err(Error::HeaderSizeInvalid {
                    expected: header.head_size,
                    actual: region.len() as u64,
                });
            }
            Ok(region)
        } else {
            let key = key::derive_scramble_key(key_string);
            let mut region = Self::slice_region(mmap, header.name_table_start, header.head_size)?;
            xor::xor_apply(&mut region, 0, &key);
            Ok(region)
        }
    }

    fn slice_region(mmap: &[u8], start: u64, len: u64) -> Result<Vec<u8>> {
        mmap.get(start as usize..)
            .and_then(|s| s.get(..len as usize))
            .map(<[u8]>::to_vec)
            .ok_or(Error::TruncatedStream)
    }
}
