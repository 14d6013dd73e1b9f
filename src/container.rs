//! The byte-container seam: file-backed (memory-mapped) and in-memory
//! implementations, so the engine above never needs to know which one
//! it's holding. `BufferContainer` is the in-memory buffer used in tests.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};

/// A fixed-size, randomly addressable byte region a `WhisperFile` reads
/// and writes through. Size is frozen at create time; whisper files
/// never grow or shrink after creation.
pub trait WhisperContainer {
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes buffered writes. For the in-memory container this is a
    /// no-op; for the mmap container it's `MmapMut::flush`.
    fn flush(&mut self) -> io::Result<()>;

    /// Best-effort durability sync; a failure here is not fatal.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// A memory-mapped on-disk file.
pub struct MmapContainer {
    mmap: MmapMut,
    // Kept alive so the mapping stays valid; not read/written directly.
    _file: File,
}

impl MmapContainer {
    /// Creates a new file of exactly `size` bytes and maps it. `sparse`
    /// controls whether the bytes are actually zero-written (dense) or
    /// only the file length is extended (sparse).
    pub fn create<P: AsRef<Path>>(path: P, size: u64, sparse: bool) -> io::Result<MmapContainer> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;

        if sparse {
            if size > 0 {
                file.set_len(size)?;
            }
        } else {
            zero_fill(&file, size)?;
        }

        Self::from_file(file)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<MmapContainer> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Self::from_file(file)
    }

    fn from_file(file: File) -> io::Result<MmapContainer> {
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(MmapContainer { mmap, _file: file })
    }
}

impl WhisperContainer for MmapContainer {
    fn as_slice(&self) -> &[u8] {
        &self.mmap[..]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    fn flush(&mut self) -> io::Result<()> {
        self.mmap.flush()
    }
}

/// Writes `size` zero bytes to `file` in fixed-size chunks rather than
/// one giant allocation.
fn zero_fill(file: &File, size: u64) -> io::Result<()> {
    use std::io::Write;

    const CHUNK: usize = 16 * 1024;
    file.set_len(0)?;
    let zeros = [0u8; CHUNK];
    let mut remaining = size;
    let mut f = file;
    while remaining > 0 {
        let n = std::cmp::min(remaining, CHUNK as u64) as usize;
        Write::write_all(&mut f, &zeros[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

/// An in-memory byte buffer standing in for a file, for tests and for
/// transient (non-persisted) whisper files.
pub struct BufferContainer {
    buf: Vec<u8>,
}

impl BufferContainer {
    pub fn new(size: usize) -> BufferContainer {
        BufferContainer {
            buf: vec![0u8; size],
        }
    }

    pub fn from_bytes(buf: Vec<u8>) -> BufferContainer {
        BufferContainer { buf }
    }
}

impl WhisperContainer for BufferContainer {
    fn as_slice(&self) -> &[u8] {
        &self.buf[..]
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_container_round_trips_bytes() {
        let mut c = BufferContainer::new(16);
        c.as_mut_slice()[0] = 0xAB;
        assert_eq!(c.as_slice()[0], 0xAB);
        assert_eq!(c.len(), 16);
    }
}
