//! The payload pipeline (C7): reads one planned file's bytes out of the
//! archive, applying whichever combination of XOR / LZ / Huffman its plan
//! calls for (`spec.md` §4.7).

use crate::archive::walker::ExtractPlan;
use crate::error::{Error, Result};
use crate::huffman;
use crate::lz;
use crate::xor;
use std::io::Write;

const SENTINEL: u64 = u64::MAX;
const BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Extracts `plan`'s file and returns its decoded bytes.
///
/// `archive` is the whole memory-mapped (or otherwise addressable) archive;
/// `xor_offset_threaded` matches `Version::xor_offset_threaded` for the
/// archive being read.
pub fn extract(archive: &[u8], plan: &ExtractPlan, xor_offset_threaded: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(plan.data_size as usize);
    extract_into(archive, plan, xor_offset_threaded, &mut out)?;
    Ok(out)
}

/// Same as [`extract`], but writes into any `Write` sink instead of
/// allocating a returned buffer.
pub fn extract_into(archive: &[u8], plan: &ExtractPlan, xor_offset_threaded: bool, out: &mut impl Write) -> Result<()> {
    match (plan.lz_compressed, plan.huffman_compressed) {
        (false, false) => extract_raw(archive, plan, xor_offset_threaded, out),
        (true, false) => extract_lz_only(archive, plan, out),
        (false, true) => extract_huffman_only(archive, plan, out),
        (true, true) => extract_huffman_lz(archive, plan, out),
    }
}

fn slice_at<'a>(archive: &'a [u8], start: u64, len: u64) -> Result<&'a [u8]> {
    let start = start as usize;
    let len = len as usize;
    archive.get(start..start + len).ok_or(Error::TruncatedStream)
}

/// `(raw, raw)`: chunked straight-through read with a per-chunk XOR offset
/// (`spec.md`'s "for large files, read in `DXA_BUFFERSIZE` chunks" note).
fn extract_raw(archive: &[u8], plan: &ExtractPlan, xor_offset_threaded: bool, out: &mut impl Write) -> Result<()> {
    let total = plan.data_size as usize;
    let mut written = 0usize;
    while written < total {
        let chunk_len = (total - written).min(BUFFER_SIZE);
        let mut chunk = slice_at(archive, plan.data_start + written as u64, chunk_len as u64)?.to_vec();
        if let Some(key) = &plan.key {
            let offset = if xor_offset_threaded {
                plan.data_size + written as u64
            } else {
                plan.data_start + written as u64
            };
            xor::xor_apply(&mut chunk, offset, key);
        }
        out.write_all(&chunk)?;
        written += chunk_len;
    }
    Ok(())
}

/// `(LZ, raw)`: read `press_size` ciphertext bytes, XOR-decrypt at offset
/// `data_size`, LZ-decode to `data_size` bytes.
fn extract_lz_only(archive: &[u8], plan: &ExtractPlan, out: &mut impl Write) -> Result<()> {
    let mut cipher = slice_at(archive, plan.data_start, plan.press_size)?.to_vec();
    if let Some(key) = &plan.key {
        xor::xor_apply(&mut cipher, plan.data_size, key);
    }
    let decoded = lz::decode(&cipher)?;
    if decoded.len() as u64 != plan.data_size {
        return Err(Error::CodecInvariantViolated);
    }
    out.write_all(&decoded)?;
    Ok(())
}

/// `(raw, Huffman)`, with the partial-Huffman-at-ends policy for large
/// files: Huffman covers only the first and last `huffman_encode_kb*1024`
/// bytes when `huffman_encode_kb != 0xFF` and the file is more than twice
/// that size; the middle is a separate raw-XOR segment read at offset
/// `data_size + huff_press_size`.
fn extract_huffman_only(archive: &[u8], plan: &ExtractPlan, out: &mut impl Write) -> Result<()> {
    let body = decode_huffman_body(archive, plan)?;
    out.write_all(&body)?;
    Ok(())
}

/// `(LZ, Huffman)`: as above, but the Huffman-decoded stream is itself an
/// LZ stream; the two-ends rule applies to the LZ stream (length
/// `press_size`), and the final LZ-decode yields `data_size` bytes.
fn extract_huffman_lz(archive: &[u8], plan: &ExtractPlan, out: &mut impl Write) -> Result<()> {
    let lz_stream = decode_huffman_body(archive, plan)?;
    let decoded = lz::decode(&lz_stream)?;
    if decoded.len() as u64 != plan.data_size {
        return Err(Error::CodecInvariantViolated);
    }
    out.write_all(&decoded)?;
    Ok(())
}

/// Shared by the two Huffman-flagged branches: reads `huff_press_size`
/// bytes, applies the partial-ends policy, and returns the fully
/// reassembled post-Huffman stream (which is `data_size` bytes for the
/// `(raw, Huffman)` case, or `press_size` bytes -- still LZ-compressed --
/// for the `(LZ, Huffman)` case).
fn decode_huffman_body(archive: &[u8], plan: &ExtractPlan) -> Result<Vec<u8>> {
    let logical_size = if plan.lz_compressed { plan.press_size } else { plan.data_size };

    let full_coverage = plan.huffman_encode_kb() == 0xFF || logical_size <= 2 * plan.huffman_encode_kb() as u64 * 1024;

    if full_coverage {
        let mut cipher = slice_at(archive, plan.data_start, plan.huff_press_size)?.to_vec();
        if let Some(key) = &plan.key {
            xor::xor_apply(&mut cipher, plan.data_size, key);
        }
        return huffman::decode(&cipher);
    }

    let edge = plan.huffman_encode_kb() as u64 * 1024;
    let middle_len = logical_size - 2 * edge;

    let mut huff_cipher = slice_at(archive, plan.data_start, plan.huff_press_size)?.to_vec();
    if let Some(key) = &plan.key {
        xor::xor_apply(&mut huff_cipher, plan.data_size, key);
    }
    let edges = huffman::decode(&huff_cipher)?;
    if edges.len() as u64 != 2 * edge {
        return Err(Error::CodecInvariantViolated);
    }

    let middle_start = plan.data_start + plan.huff_press_size;
    let mut middle = slice_at(archive, middle_start, middle_len)?.to_vec();
    if let Some(key) = &plan.key {
        xor::xor_apply(&mut middle, plan.data_size + plan.huff_press_size, key);
    }

    let mut out = Vec::with_capacity(logical_size as usize);
    out.extend_from_slice(&edges[..edge as usize]);
    out.extend_from_slice(&middle);
    out.extend_from_slice(&edges[edge as usize..]);
    Ok(out)
}

impl ExtractPlan {
    /// The archive-wide `huffman_encode_kb` policy value this plan was
    /// built under; stashed per-plan so the payload pipeline doesn't need
    /// to thread the header through separately.
    fn huffman_encode_kb(&self) -> u8 {
        self.huffman_encode_kb
    }
}
