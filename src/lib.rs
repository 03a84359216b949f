//! Content addressed chunk archive
//!
//! An archive is a single immutable file holding many compressed chunks,
//! each keyed by a 20 byte content hash. A reader fetches the fixed size
//! footer at the end of the file, walks backward to the index, and from
//! there can locate any chunk by hash prefix with a ranged read.
//!
//! This file format needs to support several use cases such as:
//! - Batch write-once production (write, seal, never touch again)
//! - Fetch+Seek (read the footer, then the index, then ranged chunk reads)
//!
//! Unless otherwise noted multi-byte integers are stored in Big Endian
//! format.
//!
//! # Top Level
//!
//! | Type    | Name     | Description |
//! | ------: | -------- | ----------- |
//! | [u8; N] | data     | Byte spans concatenated in staging order |
//! | [u8; N] | index    | zstd compressed index stream, see [Index](#index) |
//! | [u8; N] | metadata | Raw metadata bytes, no framing |
//! | [u8; 216] | footer | Fixed layout, see [Footer](#footer) |
//!
//! # Index
//!
//! The index is one zstd stream (level 6). Its uncompressed content, in
//! order, with chunks sorted bytewise ascending on the full 20 byte hash:
//!
//! | Type        | Name       | Description |
//! | ----------: | ---------- | ----------- |
//! | [u64; S]    | span lens  | Length of each byte span, staging order. Offsets are the running sum |
//! | [u64; C]    | prefix deltas | `prefix(i) - prefix(i-1)` per sorted chunk, `prefix(-1) = 0` |
//! | [varint; 2C] | chunk refs | Per sorted chunk: dictionary span ID then data span ID, unsigned LEB128 |
//! | [[u8; 12]; C] | suffixes | Trailing 12 hash bytes per sorted chunk |
//!
//! Span ID 0 is reserved to mean "no span"; a chunk with no compression
//! dictionary carries dictionary ID 0.
//!
//! # Footer
//!
//! | Type     | Name              | Description |
//! | -------: | ----------------- | ----------- |
//! | u32      | index length      | Compressed size of the index stream |
//! | u32      | span count        | Number of byte spans |
//! | u32      | chunk count       | Number of chunks |
//! | u32      | metadata length   | Size of the metadata region |
//! | [u8; 64] | data checksum     | SHA-512 over the data region |
//! | [u8; 64] | index checksum    | SHA-512 over the index region |
//! | [u8; 64] | metadata checksum | SHA-512 over the metadata region |
//! | u8       | version           | [`ARCHIVE_FORMAT_VERSION`] |
//! | [u8; 7]  | signature         | [`ARCHIVE_FILE_SIGNATURE`] |
//!
//! The three checksum domains do not overlap and cover every byte up to
//! the footer.

pub mod error;
pub mod hash;
pub mod sink;
pub mod varint;
pub mod writer;

pub use crate::error::ArchiveError;
pub use crate::hash::ChunkHash;
pub use crate::sink::{ByteSink, FileSink, HashingSink, MemorySink};
pub use crate::writer::ArchiveWriter;

/// Version byte written into the footer.
pub const ARCHIVE_FORMAT_VERSION: u8 = 1;

/// Trailing magic, the last bytes of every archive file.
pub const ARCHIVE_FILE_SIGNATURE: &[u8] = b"CARCEND";

/// Width of the fixed footer fields.
pub const U32_LEN: usize = 4;

/// Total footer size: four u32 fields, three checksums, version, signature.
pub const FOOTER_LEN: usize =
    4 * U32_LEN + 3 * crate::sink::SHA512_LEN + 1 + ARCHIVE_FILE_SIGNATURE.len();
