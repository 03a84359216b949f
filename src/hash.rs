use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use hex::FromHexError;

/// Total size of a chunk hash.
pub const HASH_LEN: usize = 20;

/// Leading bytes folded into the u64 prefix.
pub const PREFIX_LEN: usize = 8;

/// Trailing bytes stored verbatim in the index.
pub const SUFFIX_LEN: usize = HASH_LEN - PREFIX_LEN;

/// A 20 byte content digest identifying one chunk.
///
/// The archive index never stores the hash whole: the first 8 bytes
/// travel as a big endian u64 prefix (delta encoded), the remaining 12
/// bytes as a raw suffix. Ordering is bytewise over all 20 bytes, which
/// the derived `Ord` on the inner array already is.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkHash([u8; HASH_LEN]);

impl ChunkHash {
    pub fn new(bytes: [u8; HASH_LEN]) -> Self {
        ChunkHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// The most significant 8 bytes, as a big endian u64.
    pub fn prefix(&self) -> u64 {
        BigEndian::read_u64(&self.0[..PREFIX_LEN])
    }

    /// The trailing 12 bytes.
    pub fn suffix(&self) -> &[u8] {
        &self.0[PREFIX_LEN..]
    }
}

impl From<[u8; HASH_LEN]> for ChunkHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        ChunkHash(bytes)
    }
}

// To encapsulate the hex engine used
pub fn from_hex(hash: &str) -> Result<ChunkHash, FromHexError> {
    let mut bytes: [u8; HASH_LEN] = [0; HASH_LEN];
    hex::decode_to_slice(hash, &mut bytes)?;
    Ok(ChunkHash(bytes))
}

pub fn to_hex(hash: &ChunkHash) -> String {
    hex::encode(hash.0)
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ChunkHash({})", to_hex(self))
    }
}
