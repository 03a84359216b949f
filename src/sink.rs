use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use sha2::{Digest, Sha512};
use tempfile::NamedTempFile;

/// Size of one checksum domain digest.
pub const SHA512_LEN: usize = 64;

/// A sealed checksum domain.
pub type Sha512Sum = [u8; SHA512_LEN];

/// Destination for archive bytes.
///
/// The writer owns its sink exclusively and pushes every byte of the
/// archive through it in order. Once the archive is complete the sink is
/// asked to durably land the accumulated bytes at a final path.
pub trait ByteSink: Write {
    /// Hook for buffered sinks to settle their contents ahead of
    /// [`ByteSink::persist`]. The default is a no-op.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Durably place everything written so far at `path`.
    fn persist(&mut self, path: &Path) -> io::Result<()>;
}

/// Sink that accumulates the archive in memory.
pub struct MemorySink {
    buf: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink { buf: Vec::new() }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        MemorySink::new()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteSink for MemorySink {
    fn persist(&mut self, path: &Path) -> io::Result<()> {
        fs::write(path, &self.buf)
    }
}

/// Sink that spools the archive into a temp file, then renames it into
/// place on persist.
///
/// The temp file lives in the directory handed to [`FileSink::new`] so
/// the final rename stays on one filesystem. A sink persists once;
/// writes after that fail.
pub struct FileSink {
    file: Option<BufWriter<NamedTempFile>>,
}

impl FileSink {
    pub fn new(dir: &Path) -> io::Result<Self> {
        let tmp = NamedTempFile::new_in(dir)?;
        Ok(FileSink {
            file: Some(BufWriter::new(tmp)),
        })
    }

    fn inner(&mut self) -> io::Result<&mut BufWriter<NamedTempFile>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file sink already persisted"))
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()
    }
}

impl ByteSink for FileSink {
    fn finish(&mut self) -> io::Result<()> {
        let file = self.inner()?;
        file.flush()?;
        file.get_ref().as_file().sync_all()
    }

    fn persist(&mut self, path: &Path) -> io::Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file sink already persisted"))?;
        let tmp = file.into_inner().map_err(|e| e.into_error())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Relay sink maintaining a rolling SHA-512 and the byte counter.
///
/// Every byte of the archive flows through here. The hasher covers one
/// checksum domain at a time: the writer snapshots it with
/// [`HashingSink::current_sum`] at a domain boundary and then calls
/// [`HashingSink::reset_hasher`] to open the next domain. The counter is
/// never reset and is the authoritative archive length.
pub struct HashingSink<S: ByteSink> {
    inner: S,
    hasher: Sha512,
    bytes_written: u64,
}

impl<S: ByteSink> HashingSink<S> {
    pub fn new(inner: S) -> Self {
        HashingSink {
            inner,
            hasher: Sha512::new(),
            bytes_written: 0,
        }
    }

    /// Total bytes relayed to the backing sink since creation.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// SHA-512 of everything written since the last reset. Does not
    /// disturb the rolling state.
    pub fn current_sum(&self) -> Sha512Sum {
        let digest = self.hasher.clone().finalize();
        let mut sum = [0u8; SHA512_LEN];
        sum.copy_from_slice(&digest);
        sum
    }

    /// Start a fresh accumulation from the current position. The write
    /// cursor does not move.
    pub fn reset_hasher(&mut self) {
        self.hasher = Sha512::new();
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.inner.finish()
    }

    pub fn flush_to_path(&mut self, path: &Path) -> io::Result<()> {
        self.inner.persist(path)
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ByteSink> Write for HashingSink<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // Only the bytes the sink accepted exist in the file, so only
        // those enter the hash.
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
