#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc)]

pub mod archive;
mod crc32;
mod error;
mod huffman;
mod key;
mod lz;
mod names;
mod version;
mod xor;

pub use archive::{Archive, ExtractPlan};
pub use error::{Error, Result};
pub use key::DEFAULT_KEY_STRING;

pub mod prelude {
    pub use crate::{Archive, ExtractPlan};
}
