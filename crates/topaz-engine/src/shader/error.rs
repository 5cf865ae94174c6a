use std::fmt;

use topaz_glsl::{LayoutError, ParseError};

use crate::buffer::{BufferError, ManagerId};

/// Why a preprocessing pass failed. A failed pass leaves the source untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessError {
    /// A directive is malformed.
    Parse(ParseError),
    /// A block's fields cannot be laid out.
    Layout { block: String, source: LayoutError },
    /// The same block name appears twice in one source.
    DuplicateBlockName { name: String, line: usize },
    /// A block name registered by an earlier pass comes back with a different layout.
    ConflictingBlockLayout { name: String, registered_size: u64, size: u64 },
    /// The module's buffers live in another manager.
    ForeignManager { expected: ManagerId, actual: ManagerId },
    /// `binding_base` plus the block's ordinal does not fit in a `u32`.
    BindingOverflow { name: String, binding_base: u32 },
    Buffer(BufferError),
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessError::Parse(e) => write!(f, "{e}"),
            PreprocessError::Layout { block, source } => write!(f, "block '{block}': {source}"),
            PreprocessError::DuplicateBlockName { name, line } => {
                write!(f, "line {line}: block '{name}' is declared more than once")
            }
            PreprocessError::ConflictingBlockLayout { name, registered_size, size } => write!(
                f,
                "block '{name}' was registered with a {registered_size}-byte layout, \
                 this source declares a different {size}-byte layout"
            ),
            PreprocessError::ForeignManager { expected, actual } => write!(
                f,
                "module registered its buffers in manager {expected:?}, not {actual:?}"
            ),
            PreprocessError::BindingOverflow { name, binding_base } => write!(
                f,
                "block '{name}' has no binding index left after base {binding_base}"
            ),
            PreprocessError::Buffer(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreprocessError::Parse(e) => Some(e),
            PreprocessError::Layout { source, .. } => Some(source),
            PreprocessError::Buffer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for PreprocessError {
    fn from(e: ParseError) -> Self {
        PreprocessError::Parse(e)
    }
}

impl From<BufferError> for PreprocessError {
    fn from(e: BufferError) -> Self {
        PreprocessError::Buffer(e)
    }
}
