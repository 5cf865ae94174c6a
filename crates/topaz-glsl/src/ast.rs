use std::collections::HashMap;
use std::ops::Range;

/// Length part of an array declarator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayLen {
    /// `name[8]`
    Fixed(u64),
    /// `name[MAX_LIGHTS]`, resolved against [`Declarations::constants`].
    Constant(String),
    /// `name[]`, a runtime-sized trailing array.
    Runtime,
}

/// One member declaration inside a block or struct.
///
/// `vec4 a, b[2];` produces two fields sharing the same type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub ty: String,
    pub name: String,
    pub array: Option<ArrayLen>,
    pub line: usize,
}

/// A `#<marker> name { fields }` directive found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDirective {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    /// Byte span of the `#marker` tokens, which the rewrite replaces.
    pub marker: Range<usize>,
    /// Byte offset just past the closing `}`.
    pub body_end: usize,
    /// Whether a `;` already follows the closing `}`.
    pub terminated: bool,
    pub line: usize,
    pub col: usize,
}

/// A `struct Name { fields };` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub line: usize,
}

/// Everything outside the directives that block layouts may refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub structs: HashMap<String, StructDecl>,
    /// Integer constants from `#define NAME 4` and `const int NAME = 4;`.
    pub constants: HashMap<String, u64>,
}
