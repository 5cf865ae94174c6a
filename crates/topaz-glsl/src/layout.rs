//! std140 / std430 block layout.
//!
//! Offsets follow the GLSL 4.60 packing rules. The only difference between the two
//! rule sets that matters here is that std140 rounds array strides and struct
//! alignment up to 16 bytes, while std430 keeps the element's own alignment.

use crate::ast::{ArrayLen, Declarations, FieldDecl};
use crate::error::LayoutError;

/// Packing rules for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutRules {
    /// Uniform blocks.
    Std140,
    /// Shader storage blocks.
    Std430,
}

impl LayoutRules {
    /// The layout qualifier written into GLSL for these rules.
    pub fn qualifier(self) -> &'static str {
        match self {
            LayoutRules::Std140 => "std140",
            LayoutRules::Std430 => "std430",
        }
    }
}

/// Size and base alignment of one type under a given rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLayout {
    pub size: u64,
    pub align: u64,
}

/// Placement of one block member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub ty: String,
    pub offset: u64,
    /// Bytes occupied by the member; zero for a runtime-sized array.
    pub size: u64,
    pub align: u64,
    /// Element stride when the member is an array.
    pub array_stride: Option<u64>,
}

/// The computed layout of a whole block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    pub rules: LayoutRules,
    pub fields: Vec<FieldLayout>,
    /// Size of the fixed part of the block, in bytes.
    pub size: u64,
    /// Element stride of the trailing `T name[]` member, if any.
    pub runtime_stride: Option<u64>,
}

impl BlockLayout {
    /// Bytes needed to hold the block with `elements` entries in its runtime-sized array.
    ///
    /// Blocks without a runtime array always need [`BlockLayout::size`] bytes.
    /// `None` when the total does not fit in a `u64`.
    pub fn size_for(&self, elements: u64) -> Option<u64> {
        let tail = self.runtime_stride.map_or(Some(0), |stride| stride.checked_mul(elements))?;
        self.size.checked_add(tail)
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Lays out the members of a block in declaration order.
pub fn block_layout(
    fields: &[FieldDecl],
    rules: LayoutRules,
    decls: &Declarations,
) -> Result<BlockLayout, LayoutError> {
    let mut resolver = Resolver { rules, decls, visiting: Vec::new() };
    let mut offset = 0;
    let mut out = Vec::with_capacity(fields.len());
    let mut runtime_stride = None;

    for (i, field) in fields.iter().enumerate() {
        let elem = resolver.type_layout(field)?;

        let (size, align, array_stride) = match &field.array {
            None => (elem.size, elem.align, None),
            Some(ArrayLen::Runtime) => {
                if rules == LayoutRules::Std140 {
                    return Err(LayoutError::RuntimeArrayInUniformBlock {
                        field: field.name.clone(),
                        line: field.line,
                    });
                }
                if i + 1 != fields.len() {
                    return Err(LayoutError::RuntimeArrayNotLast {
                        field: field.name.clone(),
                        line: field.line,
                    });
                }
                let (stride, align) = resolver.array_stride(field, elem)?;
                runtime_stride = Some(stride);
                (0, align, Some(stride))
            }
            Some(len) => {
                let count = resolver.array_count(field, len)?;
                let (stride, align) = resolver.array_stride(field, elem)?;
                let size = stride.checked_mul(count).ok_or_else(|| overflow(field))?;
                (size, align, Some(stride))
            }
        };

        offset = checked_round_up(offset, align).ok_or_else(|| overflow(field))?;
        out.push(FieldLayout {
            name: field.name.clone(),
            ty: field.ty.clone(),
            offset,
            size,
            align,
            array_stride,
        });
        offset = offset.checked_add(size).ok_or_else(|| overflow(field))?;
    }

    Ok(BlockLayout { rules, fields: out, size: offset, runtime_stride })
}

/// Size and alignment of a built-in type, or `None` for anything else.
pub fn builtin_layout(ty: &str, rules: LayoutRules) -> Option<TypeLayout> {
    match ty {
        "float" | "int" | "uint" | "bool" => return Some(TypeLayout { size: 4, align: 4 }),
        "double" => return Some(TypeLayout { size: 8, align: 8 }),
        _ => {}
    }
    if is_opaque_handle(ty) {
        // Bindless samplers and images are 64-bit handles inside buffer blocks.
        return Some(TypeLayout { size: 8, align: 8 });
    }

    let (component, rest) = match ty.as_bytes().first() {
        Some(b'i' | b'u' | b'b') if ty[1..].starts_with("vec") => (4, &ty[1..]),
        Some(b'd') if ty[1..].starts_with("vec") || ty[1..].starts_with("mat") => (8, &ty[1..]),
        _ => (4, ty),
    };

    if let Some(n) = rest.strip_prefix("vec") {
        return vector_layout(component, parse_dim(n)?).into();
    }

    let dims = rest.strip_prefix("mat")?;
    let (columns, rows) = match dims.split_once('x') {
        Some((c, r)) => (parse_dim(c)?, parse_dim(r)?),
        None => {
            let n = parse_dim(dims)?;
            (n, n)
        }
    };
    let column = vector_layout(component, rows);
    let column_align = match rules {
        LayoutRules::Std140 => round_up(column.align, 16),
        LayoutRules::Std430 => column.align,
    };
    let stride = round_up(column.size, column_align);
    Some(TypeLayout { size: stride * columns, align: column_align })
}

/// Whether `ty` is an opaque type that bindless access stores as a 64-bit handle.
pub fn is_opaque_handle(ty: &str) -> bool {
    const PREFIXES: &[&str] = &["sampler", "isampler", "usampler", "image", "iimage", "uimage"];
    ty == "tz_bindless_sampler" || PREFIXES.iter().any(|p| ty.starts_with(p) && ty.len() > p.len())
}

fn parse_dim(s: &str) -> Option<u64> {
    match s {
        "2" => Some(2),
        "3" => Some(3),
        "4" => Some(4),
        _ => None,
    }
}

fn vector_layout(component: u64, n: u64) -> TypeLayout {
    let align = if n == 2 { 2 * component } else { 4 * component };
    TypeLayout { size: n * component, align }
}

fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

fn checked_round_up(value: u64, align: u64) -> Option<u64> {
    value.checked_next_multiple_of(align)
}

fn overflow(field: &FieldDecl) -> LayoutError {
    LayoutError::SizeOverflow { field: field.name.clone(), line: field.line }
}

// ── Resolver ──────────────────────────────────────────────────────────────

struct Resolver<'d> {
    rules: LayoutRules,
    decls: &'d Declarations,
    /// Structs currently being laid out, for cycle detection.
    visiting: Vec<String>,
}

impl Resolver<'_> {
    fn type_layout(&mut self, field: &FieldDecl) -> Result<TypeLayout, LayoutError> {
        if let Some(layout) = builtin_layout(&field.ty, self.rules) {
            return Ok(layout);
        }
        let decls = self.decls;
        let Some(decl) = decls.structs.get(&field.ty) else {
            return Err(LayoutError::UnsupportedFieldType {
                ty: field.ty.clone(),
                field: field.name.clone(),
                line: field.line,
            });
        };
        if self.visiting.contains(&decl.name) {
            return Err(LayoutError::RecursiveStruct { name: decl.name.clone() });
        }

        self.visiting.push(decl.name.clone());
        let mut offset = 0;
        let mut align = 1;
        for member in &decl.fields {
            let elem = self.type_layout(member)?;
            let (size, member_align) = match &member.array {
                None => (elem.size, elem.align),
                Some(ArrayLen::Runtime) => {
                    return Err(LayoutError::RuntimeArrayNotLast {
                        field: member.name.clone(),
                        line: member.line,
                    });
                }
                Some(len) => {
                    let count = self.array_count(member, len)?;
                    let (stride, a) = self.array_stride(member, elem)?;
                    (stride.checked_mul(count).ok_or_else(|| overflow(member))?, a)
                }
            };
            offset = checked_round_up(offset, member_align)
                .and_then(|o| o.checked_add(size))
                .ok_or_else(|| overflow(member))?;
            align = align.max(member_align);
        }
        self.visiting.pop();

        if self.rules == LayoutRules::Std140 {
            align = round_up(align, 16);
        }
        let size = checked_round_up(offset, align).ok_or_else(|| overflow(field))?;
        Ok(TypeLayout { size, align })
    }

    /// Returns `(stride, alignment)` for an array of `elem`.
    fn array_stride(&self, field: &FieldDecl, elem: TypeLayout) -> Result<(u64, u64), LayoutError> {
        let align = match self.rules {
            LayoutRules::Std140 => round_up(elem.align, 16),
            LayoutRules::Std430 => elem.align,
        };
        let stride = checked_round_up(elem.size, align).ok_or_else(|| overflow(field))?;
        Ok((stride, align))
    }

    fn array_count(&self, field: &FieldDecl, len: &ArrayLen) -> Result<u64, LayoutError> {
        let count = match len {
            ArrayLen::Fixed(n) => *n,
            ArrayLen::Constant(name) => *self.decls.constants.get(name).ok_or_else(|| {
                LayoutError::UnknownArrayLength {
                    constant: name.clone(),
                    field: field.name.clone(),
                    line: field.line,
                }
            })?,
            ArrayLen::Runtime => unreachable!("runtime arrays are handled by the caller"),
        };
        if count == 0 {
            return Err(LayoutError::ZeroLengthArray { field: field.name.clone(), line: field.line });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{collect_declarations, parse_directives, tokenize};

    /// Lays out the first `#ssbo`/`#ubo` block in `src`, using the rules of its marker.
    fn layout(src: &str) -> Result<BlockLayout, LayoutError> {
        let tokens = tokenize(src);
        let decls = collect_declarations(&tokens);
        let (marker, rules) = if src.contains("#ubo") {
            ("ubo", LayoutRules::Std140)
        } else {
            ("ssbo", LayoutRules::Std430)
        };
        let directive = parse_directives(&tokens, marker).unwrap().remove(0);
        block_layout(&directive.fields, rules, &decls)
    }

    fn size(src: &str) -> u64 {
        layout(src).unwrap().size
    }

    fn offsets(src: &str) -> Vec<u64> {
        layout(src).unwrap().fields.iter().map(|f| f.offset).collect()
    }

    // ── built-ins ─────────────────────────────────────────────────────────

    #[test]
    fn scalar_and_vector_sizes() {
        let l = |t| builtin_layout(t, LayoutRules::Std430).unwrap();
        assert_eq!(l("float"), TypeLayout { size: 4, align: 4 });
        assert_eq!(l("double"), TypeLayout { size: 8, align: 8 });
        assert_eq!(l("vec2"), TypeLayout { size: 8, align: 8 });
        assert_eq!(l("vec3"), TypeLayout { size: 12, align: 16 });
        assert_eq!(l("ivec4"), TypeLayout { size: 16, align: 16 });
        assert_eq!(l("dvec3"), TypeLayout { size: 24, align: 32 });
    }

    #[test]
    fn matrix_sizes() {
        let l = |t, r| builtin_layout(t, r).unwrap();
        assert_eq!(l("mat4", LayoutRules::Std430), TypeLayout { size: 64, align: 16 });
        assert_eq!(l("mat3", LayoutRules::Std430), TypeLayout { size: 48, align: 16 });
        assert_eq!(l("mat2", LayoutRules::Std430), TypeLayout { size: 16, align: 8 });
        assert_eq!(l("mat2", LayoutRules::Std140), TypeLayout { size: 32, align: 16 });
        assert_eq!(l("mat2x3", LayoutRules::Std430), TypeLayout { size: 32, align: 16 });
        assert_eq!(l("dmat4", LayoutRules::Std430), TypeLayout { size: 128, align: 32 });
    }

    #[test]
    fn opaque_handles_are_64_bit() {
        for ty in ["tz_bindless_sampler", "sampler2D", "usampler3D", "image2D"] {
            assert_eq!(builtin_layout(ty, LayoutRules::Std430), Some(TypeLayout { size: 8, align: 8 }), "{ty}");
        }
        assert!(builtin_layout("sampler", LayoutRules::Std430).is_none());
    }

    #[test]
    fn unknown_builtins() {
        for ty in ["vec5", "mat1", "bmat2", "foo", "ivec", "float2"] {
            assert!(builtin_layout(ty, LayoutRules::Std430).is_none(), "{ty}");
        }
    }

    // ── blocks ────────────────────────────────────────────────────────────

    #[test]
    fn mat4_then_vec4_is_80_bytes() {
        assert_eq!(size("#ssbo b { mat4 a; vec4 b; };"), 80);
        assert_eq!(size("#ubo b { mat4 a; vec4 b; };"), 80);
        assert_eq!(offsets("#ssbo b { mat4 a; vec4 b; };"), [0, 64]);
    }

    #[test]
    fn mat4_array_of_512() {
        let l = layout("#ssbo m { mat4 mvp[512]; };").unwrap();
        assert_eq!(l.size, 32768);
        assert_eq!(l.fields[0].array_stride, Some(64));
    }

    #[test]
    fn vec3_packs_a_trailing_scalar() {
        assert_eq!(offsets("#ssbo b { vec3 a; float b; };"), [0, 12]);
        assert_eq!(size("#ssbo b { vec3 a; float b; };"), 16);
        assert_eq!(offsets("#ssbo b { float a; vec3 b; };"), [0, 16]);
        assert_eq!(size("#ssbo b { float a; vec3 b; };"), 28);
    }

    #[test]
    fn std140_rounds_array_strides() {
        assert_eq!(size("#ssbo b { float a[4]; };"), 16);
        assert_eq!(size("#ubo b { float a[4]; };"), 64);
        assert_eq!(size("#ubo b { vec2 a[2]; };"), 32);
    }

    #[test]
    fn bindless_sampler_array() {
        assert_eq!(size("#ssbo t { tz_bindless_sampler textures[2]; };"), 16);
        assert_eq!(size("#ubo t { tz_bindless_sampler textures[2]; };"), 32);
    }

    #[test]
    fn five_vec4_scenery_block() {
        let src = "#ssbo scenery_block { vec4 snow; vec4 terrain; vec4 water; vec4 tess; vec4 magic; };";
        assert_eq!(size(src), 80);
        assert_eq!(offsets(src), [0, 16, 32, 48, 64]);
    }

    #[test]
    fn struct_members_multiply_by_count() {
        let src = "struct MVP { mat4 m; mat4 v; mat4 p; };\n#ssbo matrices { MVP mvp_element[512]; };";
        assert_eq!(size(src), 512 * 192);
    }

    #[test]
    fn struct_alignment_follows_rules() {
        let src = "struct S { float x; };\n#ssbo b { S s; float y; };";
        assert_eq!(offsets(src), [0, 4]);
        let src = "struct S { float x; };\n#ubo b { S s; float y; };";
        assert_eq!(offsets(src), [0, 16]);
    }

    #[test]
    fn nested_struct_padding() {
        let src = "struct S { vec3 p; };\n#ssbo b { S items[2]; };";
        // vec3 rounds the struct up to its 16-byte alignment.
        assert_eq!(layout(src).unwrap().fields[0].array_stride, Some(16));
        assert_eq!(size(src), 32);
    }

    #[test]
    fn constant_lengths_resolve() {
        assert_eq!(size("#define N 4\n#ssbo b { vec4 a[N]; };"), 64);
        assert_eq!(size("const uint N = 2u;\n#ssbo b { vec4 a[N]; };"), 32);
    }

    #[test]
    fn runtime_array_reports_stride() {
        let l = layout("#ssbo b { float header; mat4 items[]; };").unwrap();
        assert_eq!(l.size, 16);
        assert_eq!(l.runtime_stride, Some(64));
        assert_eq!(l.size_for(3), Some(16 + 3 * 64));
        assert_eq!(l.size_for(u64::MAX), None);
        assert_eq!(l.field("items").unwrap().size, 0);
    }

    #[test]
    fn size_for_without_runtime_array() {
        let l = layout("#ssbo b { vec4 a; };").unwrap();
        assert_eq!(l.size_for(10), Some(16));
    }

    // ── errors ────────────────────────────────────────────────────────────

    #[test]
    fn unsupported_type() {
        let e = layout("#ssbo b { vec4 a;\n Light l; };").unwrap_err();
        assert_eq!(e, LayoutError::UnsupportedFieldType { ty: "Light".into(), field: "l".into(), line: 2 });
    }

    #[test]
    fn unknown_constant() {
        assert!(matches!(layout("#ssbo b { vec4 a[N]; };"), Err(LayoutError::UnknownArrayLength { .. })));
    }

    #[test]
    fn zero_length() {
        assert!(matches!(layout("#ssbo b { vec4 a[0]; };"), Err(LayoutError::ZeroLengthArray { .. })));
    }

    #[test]
    fn runtime_array_must_be_last() {
        assert!(matches!(
            layout("#ssbo b { vec4 a[]; float b; };"),
            Err(LayoutError::RuntimeArrayNotLast { .. })
        ));
    }

    #[test]
    fn runtime_array_not_in_uniform_block() {
        assert!(matches!(
            layout("#ubo b { vec4 a[]; };"),
            Err(LayoutError::RuntimeArrayInUniformBlock { .. })
        ));
    }

    #[test]
    fn oversized_array_is_an_error() {
        assert_eq!(
            layout("#ssbo b { float a[0x4000000000000000]; };"),
            Err(LayoutError::SizeOverflow { field: "a".into(), line: 1 })
        );
    }

    #[test]
    fn oversized_block_total_is_an_error() {
        let src = "#ssbo b { float a[0x3fffffffffffffff];\n float b[0x3fffffffffffffff]; };";
        assert_eq!(layout(src), Err(LayoutError::SizeOverflow { field: "b".into(), line: 2 }));
    }

    #[test]
    fn oversized_struct_member_is_an_error() {
        let src = "struct S { mat4 m[0x0400000000000000]; };\n#ssbo b { S s; };";
        assert!(matches!(layout(src), Err(LayoutError::SizeOverflow { ref field, .. }) if field == "m"));
    }

    #[test]
    fn recursive_struct() {
        let src = "struct A { B b; };\nstruct B { A a; };\n#ssbo x { A a; };";
        assert!(matches!(layout(src), Err(LayoutError::RecursiveStruct { .. })));
    }
}
