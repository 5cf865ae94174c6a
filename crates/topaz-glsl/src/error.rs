use std::fmt;

/// A syntax error inside a Topaz directive or one of the declarations it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// 1-based source line number where the error occurred.
    pub line: usize,
    /// 1-based source column number where the error occurred.
    pub col: usize,
}

impl ParseError {
    pub(crate) fn new(msg: impl Into<String>, line: usize, col: usize) -> Self {
        Self { message: msg.into(), line, col }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "glsl parse error at {}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

/// A block whose fields cannot be laid out under the requested rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The field type is neither a built-in type nor a struct declared in the source.
    UnsupportedFieldType { ty: String, field: String, line: usize },
    /// An array length names a constant that the source never defines.
    UnknownArrayLength { constant: String, field: String, line: usize },
    /// `T name[0]` is not a valid GLSL array.
    ZeroLengthArray { field: String, line: usize },
    /// `T name[]` must be the final member of its block.
    RuntimeArrayNotLast { field: String, line: usize },
    /// Uniform blocks have a fixed size; `T name[]` is only legal in storage blocks.
    RuntimeArrayInUniformBlock { field: String, line: usize },
    /// A struct contains itself, directly or through another struct.
    RecursiveStruct { name: String },
    /// The field pushes the block past what a 64-bit byte size can hold.
    SizeOverflow { field: String, line: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::UnsupportedFieldType { ty, field, line } => {
                write!(f, "line {line}: field '{field}' has unsupported type '{ty}'")
            }
            LayoutError::UnknownArrayLength { constant, field, line } => {
                write!(
                    f,
                    "line {line}: array length '{constant}' of field '{field}' is not a known constant"
                )
            }
            LayoutError::ZeroLengthArray { field, line } => {
                write!(f, "line {line}: field '{field}' is declared with zero length")
            }
            LayoutError::RuntimeArrayNotLast { field, line } => {
                write!(
                    f,
                    "line {line}: unsized array '{field}' must be the last member of its block"
                )
            }
            LayoutError::RuntimeArrayInUniformBlock { field, line } => {
                write!(f, "line {line}: unsized array '{field}' is not allowed in a uniform block")
            }
            LayoutError::RecursiveStruct { name } => {
                write!(f, "struct '{name}' contains itself")
            }
            LayoutError::SizeOverflow { field, line } => {
                write!(f, "line {line}: field '{field}' makes the block too large")
            }
        }
    }
}

impl std::error::Error for LayoutError {}
