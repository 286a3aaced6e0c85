//! Random-access reads over a `*.sub` file.
//!
//! A single subpicture is scattered across multiple 2048-byte packs, and
//! its control header may straddle pack boundaries, so the reader needs to
//! jump around the file rather than consume it linearly.  `ByteBuffer`
//! wraps the file handle and keeps a window of it in memory, refilling the
//! window whenever a read lands outside it.

use common_failures::prelude::*;
use std::cmp;
use std::fs;
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::Path;

use errors::SubDvdError;

/// Default size of the in-memory window.
const BUFFER_SIZE: usize = 1024 * 1024;

/// A random-access, big-endian reader over a file.  Reads never advance an
/// implicit cursor; callers always pass explicit offsets.
#[derive(Debug)]
pub struct ByteBuffer {
    file: fs::File,
    size: u64,
    window: Vec<u8>,
    window_ofs: u64,
    window_len: usize,
}

impl ByteBuffer {
    /// Open the file at `path` for random-access reads.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ByteBuffer> {
        ByteBuffer::open_with_capacity(path, BUFFER_SIZE)
    }

    fn open_with_capacity<P: AsRef<Path>>(path: P, capacity: usize)
                                          -> Result<ByteBuffer> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .with_context(|_| format!("could not open {}", path.display()))?;
        let size = file.metadata()
            .with_context(|_| format!("could not stat {}", path.display()))?
            .len();
        Ok(ByteBuffer {
            file: file,
            size: size,
            window: vec![0; cmp::max(capacity, 4)],
            window_ofs: 0,
            window_len: 0,
        })
    }

    /// Total size of the underlying file, in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    fn out_of_range(&self, offset: u64, len: usize) -> Error {
        SubDvdError::Buffer {
            offset: offset,
            len: len,
            size: self.size,
        }.into()
    }

    /// Refill the window so that it starts at `offset`.
    fn fill(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        let want = cmp::min(self.window.len() as u64, self.size - offset) as usize;
        self.file.read_exact(&mut self.window[..want])?;
        self.window_ofs = offset;
        self.window_len = want;
        Ok(())
    }

    /// Read the byte at `offset`.
    pub fn read_u8(&mut self, offset: u64) -> Result<u8> {
        if offset >= self.size {
            return Err(self.out_of_range(offset, 1));
        }
        if offset < self.window_ofs
            || offset >= self.window_ofs + self.window_len as u64 {
            self.fill(offset)?;
        }
        Ok(self.window[(offset - self.window_ofs) as usize])
    }

    /// Read a big-endian 16-bit value at `offset`.
    pub fn read_u16_be(&mut self, offset: u64) -> Result<u16> {
        Ok(u16::from(self.read_u8(offset)?) << 8
           | u16::from(self.read_u8(offset + 1)?))
    }

    /// Read a big-endian 32-bit value at `offset`.
    pub fn read_u32_be(&mut self, offset: u64) -> Result<u32> {
        Ok(u32::from(self.read_u16_be(offset)?) << 16
           | u32::from(self.read_u16_be(offset + 2)?))
    }

    /// Fill `out` with the bytes starting at `offset`.
    pub fn read_bytes(&mut self, offset: u64, out: &mut [u8]) -> Result<()> {
        if offset + out.len() as u64 > self.size {
            return Err(self.out_of_range(offset, out.len()));
        }
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.read_u8(offset + i as u64)?;
        }
        Ok(())
    }

    /// Release the underlying file handle.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::process;

    use super::ByteBuffer;

    fn scratch_file(name: &str, data: &[u8]) -> ::std::path::PathBuf {
        let path = env::temp_dir()
            .join(format!("subdvd-{}-{}", process::id(), name));
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn read_big_endian_values() {
        let path = scratch_file("be.bin", &[0x01, 0x02, 0x03, 0x04, 0x05]);
        let mut buffer = ByteBuffer::open(&path).unwrap();
        assert_eq!(buffer.size(), 5);
        assert_eq!(buffer.read_u8(0).unwrap(), 0x01);
        assert_eq!(buffer.read_u8(4).unwrap(), 0x05);
        assert_eq!(buffer.read_u16_be(1).unwrap(), 0x0203);
        assert_eq!(buffer.read_u32_be(0).unwrap(), 0x01020304);
        assert!(buffer.read_u8(5).is_err());
        assert!(buffer.read_u32_be(2).is_err());
        let mut out = [0; 3];
        buffer.read_bytes(2, &mut out).unwrap();
        assert_eq!(out, [0x03, 0x04, 0x05]);
        buffer.close();
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn window_refills_on_miss() {
        let data: Vec<u8> = (0..64).collect();
        let path = scratch_file("window.bin", &data);
        let mut buffer = ByteBuffer::open_with_capacity(&path, 8).unwrap();
        assert_eq!(buffer.read_u8(0).unwrap(), 0);
        assert_eq!(buffer.read_u8(63).unwrap(), 63);
        assert_eq!(buffer.read_u8(1).unwrap(), 1);
        assert_eq!(buffer.read_u16_be(7).unwrap(), 0x0708);
        fs::remove_file(&path).unwrap();
    }
}
