//! Source-level tooling for **Topaz** shader directives.
//!
//! Topaz shaders declare buffer blocks with `#ssbo name { ... }` and
//! `#ubo name { ... }` directives instead of spelling out binding indices.
//! This crate finds those directives, parses their members, and computes
//! their std140 / std430 layouts. Rewriting the source and allocating
//! buffers happens in `topaz-engine`.
//!
//! The crate is dependency-free so offline tools (shader linters, asset
//! bakers) can use it without pulling in any GPU code.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`ast`] | `BlockDirective`, `FieldDecl`, `ArrayLen`, `StructDecl`, `Declarations` |
//! | [`error`] | `ParseError`, `LayoutError` |
//! | [`layout`] | `LayoutRules`, `BlockLayout`, `block_layout` |
//! | [`lexer`] | `Lexer`, `Token` |
//! | [`parser`] | `parse_directives`, `collect_declarations` |
//!
//! # Quick start
//!
//! ```rust
//! use topaz_glsl::{block_layout, collect_declarations, parse_directives, tokenize, LayoutRules};
//!
//! let src = "#version 460\n#ssbo matrices\n{\n    mat4 mvp;\n    vec4 tint;\n};\n";
//!
//! let tokens = tokenize(src);
//! let decls = collect_declarations(&tokens);
//! let blocks = parse_directives(&tokens, "ssbo").unwrap();
//! let layout = block_layout(&blocks[0].fields, LayoutRules::Std430, &decls).unwrap();
//! assert_eq!(layout.size, 80);
//! ```

pub mod ast;
pub mod error;
pub mod layout;
pub mod lexer;
pub mod parser;

pub use ast::{ArrayLen, BlockDirective, Declarations, FieldDecl, StructDecl};
pub use error::{LayoutError, ParseError};
pub use layout::{block_layout, BlockLayout, FieldLayout, LayoutRules};
pub use parser::{collect_declarations, parse_directives, tokenize};

#[cfg(test)]
mod terrain_tests {
    use super::*;

    /// The storage blocks of a tessellated terrain shader, as one source.
    const TERRAIN: &str = r#"#version 460
struct MVP
{
    mat4 model;
    mat4 view;
    mat4 projection;
};

#ssbo matrices
{
    MVP mvp_element[512];
};

#ssbo texture_block
{
    tz_bindless_sampler textures[2];
};

#ssbo scenery_block
{
    vec4 snow;
    vec4 terrain;
    vec4 water;
    vec4 tessellation;
    vec4 magic;
};

void main() {}
"#;

    fn sizes(src: &str) -> Vec<(String, u64)> {
        let tokens = tokenize(src);
        let decls = collect_declarations(&tokens);
        parse_directives(&tokens, "ssbo")
            .unwrap()
            .into_iter()
            .map(|d| {
                let size = block_layout(&d.fields, LayoutRules::Std430, &decls).unwrap().size;
                (d.name, size)
            })
            .collect()
    }

    #[test]
    fn terrain_block_sizes() {
        assert_eq!(
            sizes(TERRAIN),
            [
                ("matrices".to_string(), 98304),
                ("texture_block".to_string(), 16),
                ("scenery_block".to_string(), 80),
            ]
        );
    }

    #[test]
    fn no_directives() {
        assert!(sizes("#version 460\nvoid main() {}\n").is_empty());
    }

    #[test]
    fn rules_qualifiers() {
        assert_eq!(LayoutRules::Std140.qualifier(), "std140");
        assert_eq!(LayoutRules::Std430.qualifier(), "std430");
    }
}
