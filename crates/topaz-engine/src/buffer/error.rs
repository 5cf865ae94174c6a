use std::fmt;

use super::object::{BufferHandle, BufferKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The handle was never issued by this manager, or its buffer was destroyed.
    InvalidHandle(BufferHandle),
    /// The buffer already has a live mapping.
    AlreadyMapped(BufferHandle),
    KindMismatch { handle: BufferHandle, expected: BufferKind, actual: BufferKind },
    /// The buffer was sized with `terminal_resize` and can no longer change size.
    TerminalBuffer(BufferHandle),
    /// The buffer is smaller than the block layout it backs.
    Undersized { handle: BufferHandle, size: u64, required: u64 },
    OutOfBounds { handle: BufferHandle, offset: usize, len: usize, size: usize },
    /// The backend failed to allocate or upload.
    Backend { handle: BufferHandle, message: String },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::InvalidHandle(h) => write!(f, "{h} does not exist"),
            BufferError::AlreadyMapped(h) => write!(f, "{h} is already mapped"),
            BufferError::KindMismatch { handle, expected, actual } => {
                write!(f, "{handle} is a {actual} buffer, expected a {expected} buffer")
            }
            BufferError::TerminalBuffer(h) => {
                write!(f, "{h} was terminally sized and cannot be resized")
            }
            BufferError::Undersized { handle, size, required } => {
                write!(f, "{handle} holds {size} bytes but its block layout needs {required}")
            }
            BufferError::OutOfBounds { handle, offset, len, size } => {
                write!(f, "access of {len} bytes at offset {offset} overruns {handle} ({size} bytes)")
            }
            BufferError::Backend { handle, message } => {
                write!(f, "backend failure on {handle}: {message}")
            }
        }
    }
}

impl std::error::Error for BufferError {}
