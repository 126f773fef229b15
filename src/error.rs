//! Crate-wide error type, in the teacher's style: one `thiserror`-derived
//! enum per failure surface, transparent wrapping of I/O errors, and a
//! local `Result` alias.

use std::io;

/// Everything that can go wrong opening or extracting a DXA archive.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The first two bytes of the file aren't `"DX"`.
    #[error("bad magic number")]
    BadMagic,

    /// `version` is outside any decoder's accepted range.
    #[error("unsupported archive version: {0:#06x}")]
    UnsupportedVersion(u16),

    /// `head_size` was zero, or didn't match the decompressed header size.
    #[error("invalid header size: expected {expected}, got {actual}")]
    HeaderSizeInvalid { expected: u64, actual: u64 },

    /// An LZ or Huffman decoder ran out of input mid-token.
    #[error("stream ended before decoding finished")]
    TruncatedStream,

    /// An LZ back-reference pointed before the start of the output buffer,
    /// or Huffman tree construction couldn't pair two nodes.
    #[error("decoder invariant violated")]
    CodecInvariantViolated,

    /// A name table entry decoded as neither valid UTF-8 nor Shift-JIS.
    #[error("name table entry is not valid UTF-8 or Shift-JIS")]
    NameDecodeError,

    /// Propagated verbatim from the underlying file or sink.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Shorthand used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
