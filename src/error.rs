use std::io;

use thiserror::Error;

/// Everything that can go wrong while producing an archive.
///
/// All of these are fatal to the writer. Nothing is retried internally;
/// on any error the caller discards the writer and unlinks whatever
/// partial file the sink produced.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{0} called out of order")]
    OutOfOrder(&'static str),
    #[error("sink accepted fewer bytes than requested")]
    ShortWrite,
    #[error("chunk data span id is zero or exceeds staged spans")]
    InvalidChunkRange,
    #[error("chunk dictionary span id exceeds staged spans")]
    InvalidDictionaryRange,
    #[error("chunk hash already staged")]
    DuplicateChunk,
    #[error("failed to compress archive index")]
    Compression(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}
