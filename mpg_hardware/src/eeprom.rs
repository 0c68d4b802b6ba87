use std::path::{Path, PathBuf};

use mpg_traits::NonVolatile;

use crate::error::{HwError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Value of an erased cell.
pub const ERASED: u8 = 0xFF;

fn span(addr: usize, len: usize, capacity: usize) -> Result<core::ops::Range<usize>> {
    match addr.checked_add(len) {
        Some(end) if end <= capacity => Ok(addr..end),
        _ => Err(HwError::OutOfRange {
            addr,
            len,
            capacity,
        }),
    }
}

/// Volatile store for tests and simulation; starts erased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEeprom {
    bytes: Vec<u8>,
}

impl MemoryEeprom {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![ERASED; len],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl NonVolatile for MemoryEeprom {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> std::result::Result<(), BoxError> {
        let r = span(addr, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[r]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> std::result::Result<(), BoxError> {
        let r = span(addr, data.len(), self.bytes.len())?;
        self.bytes[r].copy_from_slice(data);
        Ok(())
    }
}

/// Store backed by an image file. The whole image is rewritten on every write, the
/// way a page-erase device behaves.
#[derive(Debug)]
pub struct FileEeprom {
    path: PathBuf,
    mem: MemoryEeprom,
}

impl FileEeprom {
    /// Open `path`, creating an erased image of `len` bytes when it does not exist.
    /// A shorter image is padded with erased cells; a longer one is rejected.
    pub fn open(path: impl AsRef<Path>, len: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mem = match std::fs::read(&path) {
            Ok(mut bytes) => {
                if bytes.len() > len {
                    return Err(HwError::ImageSize {
                        found: bytes.len(),
                        capacity: len,
                    });
                }
                tracing::debug!(path = %path.display(), len = bytes.len(), "image loaded");
                bytes.resize(len, ERASED);
                MemoryEeprom::from_bytes(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), len, "creating erased image");
                let mem = MemoryEeprom::new(len);
                std::fs::write(&path, mem.bytes())?;
                mem
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, mem })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        std::fs::write(&self.path, self.mem.bytes())?;
        Ok(())
    }
}

impl NonVolatile for FileEeprom {
    fn capacity(&self) -> usize {
        self.mem.capacity()
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> std::result::Result<(), BoxError> {
        self.mem.read(addr, buf)
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> std::result::Result<(), BoxError> {
        self.mem.write(addr, data)?;
        self.flush()?;
        Ok(())
    }
}
