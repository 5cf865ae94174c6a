use std::fmt;

use crate::buffer::{BufferError, BufferHandle};
use crate::shader::ProgramId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The program failed to compile or link and can never be bound.
    ProgramNotLinked(ProgramId),
    /// `draw` was called before any program was bound.
    NoProgram,
    Buffer(BufferError),
    /// A bound buffer still has a live mapping.
    BufferMapped(BufferHandle),
    /// A bound buffer is smaller than the block it backs.
    Undersized { handle: BufferHandle, size: u64, required: u64 },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ProgramNotLinked(id) => write!(f, "program {id:?} is not linked"),
            RenderError::NoProgram => f.write_str("no program bound"),
            RenderError::Buffer(e) => write!(f, "{e}"),
            RenderError::BufferMapped(h) => write!(f, "{h} is still mapped"),
            RenderError::Undersized { handle, size, required } => {
                write!(f, "{handle} holds {size} bytes but its block layout needs {required}")
            }
        }
    }
}

impl std::error::Error for RenderError {}

impl From<BufferError> for RenderError {
    fn from(e: BufferError) -> Self {
        RenderError::Buffer(e)
    }
}
