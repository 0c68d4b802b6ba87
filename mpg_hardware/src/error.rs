use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("access of {len} bytes at {addr:#x} exceeds store of {capacity} bytes")]
    OutOfRange {
        addr: usize,
        len: usize,
        capacity: usize,
    },
    #[error("image is {found} bytes, store holds {capacity}")]
    ImageSize { found: usize, capacity: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
