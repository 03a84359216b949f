use std::collections::HashSet;
use std::io::{copy, Write};
use std::path::Path;

use log::debug;
use zstd::stream::read::Encoder;

use crate::error::ArchiveError;
use crate::hash::ChunkHash;
use crate::sink::{ByteSink, HashingSink, Sha512Sum, SHA512_LEN};
use crate::varint;
use crate::{ARCHIVE_FILE_SIGNATURE, ARCHIVE_FORMAT_VERSION};

// zstd level for the index stream
const INDEX_COMPRESSION_LEVEL: i32 = 6;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum WorkflowStage {
    ByteSpan,
    Index,
    Metadata,
    Footer,
    Flush,
}

#[derive(Clone, Copy, Debug)]
struct StagedByteSpan {
    offset: u64,
    length: u64,
}

#[derive(Clone, Copy, Debug)]
struct StagedChunkRef {
    hash: ChunkHash,
    dictionary: u32,
    data: u32,
}

/// Single use producer for one archive file.
///
/// There is a workflow to writing an archive, and every operation is
/// legal in exactly one stage:
///
/// 1. [`write_byte_span`](Self::write_byte_span): push a group of bytes
///    straight into the sink, get back a 1-based span ID.
/// 2. [`stage_chunk`](Self::stage_chunk): record a chunk as a hash plus
///    dictionary and data span IDs. Nothing hits the sink yet. Steps 1
///    and 2 interleave freely.
/// 3. [`finalize_byte_spans`](Self::finalize_byte_spans): seal the data
///    region checksum. No more spans or chunks after this.
/// 4. [`write_index`](Self::write_index): emit the compressed index and
///    seal its checksum.
/// 5. [`write_metadata`](Self::write_metadata): emit the raw metadata
///    blob and seal its checksum.
/// 6. [`write_footer`](Self::write_footer): emit counts, lengths,
///    checksums, version, signature.
/// 7. [`flush_to_file`](Self::flush_to_file): land the finished archive
///    at its path.
///
/// Any error is fatal: discard the writer and unlink whatever the sink
/// left behind.
pub struct ArchiveWriter<S: ByteSink> {
    output: HashingSink<S>,
    staged_spans: Vec<StagedByteSpan>,
    staged_chunks: Vec<StagedChunkRef>,
    seen_chunks: HashSet<ChunkHash>,
    index_len: u32,
    metadata_len: u32,
    data_checksum: Sha512Sum,
    index_checksum: Sha512Sum,
    metadata_checksum: Sha512Sum,
    stage: WorkflowStage,
}

impl<S: ByteSink> ArchiveWriter<S> {
    pub fn new(sink: S) -> Self {
        ArchiveWriter {
            output: HashingSink::new(sink),
            staged_spans: Vec::new(),
            staged_chunks: Vec::new(),
            seen_chunks: HashSet::new(),
            index_len: 0,
            metadata_len: 0,
            data_checksum: [0; SHA512_LEN],
            index_checksum: [0; SHA512_LEN],
            metadata_checksum: [0; SHA512_LEN],
            stage: WorkflowStage::ByteSpan,
        }
    }

    /// Total bytes relayed to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.output.bytes_written()
    }

    pub fn span_count(&self) -> u32 {
        self.staged_spans.len() as u32
    }

    pub fn chunk_count(&self) -> u32 {
        self.staged_chunks.len() as u32
    }

    /// Whether this hash has already been staged. Never mutates, legal
    /// at any stage.
    pub fn chunk_seen(&self, hash: ChunkHash) -> bool {
        self.seen_chunks.contains(&hash)
    }

    pub fn into_inner(self) -> S {
        self.output.into_inner()
    }

    // One write call, no retry. The sink taking less than the whole
    // buffer is fatal.
    fn put(&mut self, buf: &[u8]) -> Result<(), ArchiveError> {
        let n = self.output.write(buf)?;
        if n != buf.len() {
            return Err(ArchiveError::ShortWrite);
        }
        Ok(())
    }

    /// Write a group of bytes to the archive, returning the span ID for
    /// it. An empty input is a no-op that returns the reserved ID 0 and
    /// leaves the sink untouched. The input is consumed by this call;
    /// the caller may reuse its buffer immediately.
    pub fn write_byte_span(&mut self, data: &[u8]) -> Result<u32, ArchiveError> {
        if self.stage != WorkflowStage::ByteSpan {
            return Err(ArchiveError::OutOfOrder("write_byte_span"));
        }

        if data.is_empty() {
            return Ok(0);
        }

        let offset = self.output.bytes_written();
        if let Some(last) = self.staged_spans.last() {
            // Spans are the only writes in this stage, so they tile the
            // data region exactly
            debug_assert_eq!(offset, last.offset + last.length);
        }

        self.put(data)?;
        self.staged_spans.push(StagedByteSpan {
            offset,
            length: data.len() as u64,
        });

        Ok(self.staged_spans.len() as u32)
    }

    /// Record a chunk as a hash plus two span IDs staged earlier. The
    /// data span is required; dictionary ID 0 means the chunk has no
    /// compression dictionary. Nothing is written until
    /// [`write_index`](Self::write_index).
    pub fn stage_chunk(
        &mut self,
        hash: ChunkHash,
        dictionary: u32,
        data: u32,
    ) -> Result<(), ArchiveError> {
        if self.stage != WorkflowStage::ByteSpan {
            return Err(ArchiveError::OutOfOrder("stage_chunk"));
        }

        let spans = self.staged_spans.len() as u32;
        if data == 0 || data > spans {
            return Err(ArchiveError::InvalidChunkRange);
        }
        if dictionary > spans {
            return Err(ArchiveError::InvalidDictionaryRange);
        }
        if !self.seen_chunks.insert(hash) {
            return Err(ArchiveError::DuplicateChunk);
        }

        self.staged_chunks.push(StagedChunkRef {
            hash,
            dictionary,
            data,
        });

        Ok(())
    }

    /// Seal the data region. After this no spans or chunks can be
    /// staged.
    pub fn finalize_byte_spans(&mut self) -> Result<(), ArchiveError> {
        if self.stage != WorkflowStage::ByteSpan {
            return Err(ArchiveError::OutOfOrder("finalize_byte_spans"));
        }

        self.data_checksum = self.output.current_sum();
        self.output.reset_hasher();
        self.stage = WorkflowStage::Index;

        debug!(
            "data region sealed: {} spans, {} chunks, {} bytes",
            self.staged_spans.len(),
            self.staged_chunks.len(),
            self.output.bytes_written()
        );

        Ok(())
    }

    /// Emit the index: span length table, then the sorted chunk list in
    /// its three forms (prefix deltas, reference pairs, suffixes), the
    /// whole section as one zstd stream.
    pub fn write_index(&mut self) -> Result<(), ArchiveError> {
        if self.stage != WorkflowStage::Index {
            return Err(ArchiveError::OutOfOrder("write_index"));
        }

        let mut index: Vec<u8> = Vec::new();

        // Span lengths in staging order; offsets are the running sum on
        // the reader side
        for span in &self.staged_spans {
            index.extend_from_slice(&span.length.to_be_bytes());
        }

        // Bytewise ascending over the whole hash. The prefix deltas
        // below are non-negative only under this order.
        self.staged_chunks
            .sort_unstable_by(|a, b| a.hash.cmp(&b.hash));

        let mut last_prefix = 0u64;
        for scr in &self.staged_chunks {
            let delta = scr.hash.prefix() - last_prefix;
            index.extend_from_slice(&delta.to_be_bytes());
            last_prefix = scr.hash.prefix();
        }

        let mut vbuf = [0u8; varint::MAX_VARINT_LEN];
        for scr in &self.staged_chunks {
            let n = varint::encode(scr.dictionary as u64, &mut vbuf);
            index.extend_from_slice(&vbuf[..n]);
            let n = varint::encode(scr.data as u64, &mut vbuf);
            index.extend_from_slice(&vbuf[..n]);
        }

        for scr in &self.staged_chunks {
            index.extend_from_slice(scr.hash.suffix());
        }

        // Drain the streaming compressor into the sink. The copy loop
        // returns only once the compressor has consumed the whole image
        // and flushed its final frame, so compressor errors surface
        // before the checksum below seals the region.
        let before = self.output.bytes_written();
        let mut comp =
            Encoder::new(&index[..], INDEX_COMPRESSION_LEVEL).map_err(ArchiveError::Compression)?;
        copy(&mut comp, &mut self.output).map_err(ArchiveError::Compression)?;

        self.index_len = (self.output.bytes_written() - before) as u32;
        self.index_checksum = self.output.current_sum();
        self.output.reset_hasher();
        self.stage = WorkflowStage::Metadata;

        debug!(
            "index written: {} bytes raw, {} bytes compressed",
            index.len(),
            self.index_len
        );

        Ok(())
    }

    /// Write the metadata blob verbatim, no compression or framing. An
    /// empty slice is a valid zero length blob.
    pub fn write_metadata(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        if self.stage != WorkflowStage::Metadata {
            return Err(ArchiveError::OutOfOrder("write_metadata"));
        }

        self.put(data)?;
        self.metadata_len = data.len() as u32;
        self.metadata_checksum = self.output.current_sum();
        self.output.reset_hasher();
        self.stage = WorkflowStage::Footer;

        Ok(())
    }

    /// Emit the fixed size footer: counts and lengths, the three domain
    /// checksums, the format version, and the file signature.
    pub fn write_footer(&mut self) -> Result<(), ArchiveError> {
        if self.stage != WorkflowStage::Footer {
            return Err(ArchiveError::OutOfOrder("write_footer"));
        }

        let index_len = self.index_len;
        let span_count = self.staged_spans.len() as u32;
        let chunk_count = self.staged_chunks.len() as u32;
        let metadata_len = self.metadata_len;

        self.put(&index_len.to_be_bytes())?;
        self.put(&span_count.to_be_bytes())?;
        self.put(&chunk_count.to_be_bytes())?;
        self.put(&metadata_len.to_be_bytes())?;

        let data_checksum = self.data_checksum;
        let index_checksum = self.index_checksum;
        let metadata_checksum = self.metadata_checksum;
        self.put(&data_checksum)?;
        self.put(&index_checksum)?;
        self.put(&metadata_checksum)?;

        self.put(&[ARCHIVE_FORMAT_VERSION])?;
        self.put(ARCHIVE_FILE_SIGNATURE)?;
        self.stage = WorkflowStage::Flush;

        Ok(())
    }

    /// Land the finished archive at `path`. Buffered sinks settle their
    /// contents first.
    pub fn flush_to_file(&mut self, path: &Path) -> Result<(), ArchiveError> {
        if self.stage != WorkflowStage::Flush {
            return Err(ArchiveError::OutOfOrder("flush_to_file"));
        }

        self.output.finish()?;
        self.output.flush_to_path(path)?;

        debug!(
            "archive flushed to {}: {} bytes",
            path.display(),
            self.output.bytes_written()
        );

        Ok(())
    }
}
