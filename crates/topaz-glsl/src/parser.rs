use crate::ast::{ArrayLen, BlockDirective, Declarations, FieldDecl, StructDecl};
use crate::error::ParseError;
use crate::lexer::{parse_int_literal, Lexer, Token, TokenWithPos};

/// Qualifiers that may precede a member type and do not affect its layout.
const MEMBER_QUALIFIERS: &[&str] = &[
    "readonly", "writeonly", "coherent", "volatile", "restrict",
    "highp", "mediump", "lowp", "precise", "invariant",
];

// ── Parser ────────────────────────────────────────────────────────────────

pub struct Parser<'t> {
    tokens: &'t [TokenWithPos],
    pos: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [TokenWithPos]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn at(tokens: &'t [TokenWithPos], pos: usize) -> Self {
        Self { tokens, pos }
    }

    fn current_pos(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.col))
            .unwrap_or((1, 1))
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn peek_ahead(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn current(&self) -> Option<&'t TokenWithPos> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos)
            .map(|t| t.token.clone())
            .unwrap_or(Token::Eof);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        let (line, col) = self.current_pos();
        ParseError::new(msg, line, col)
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(s) => { self.advance(); Ok(s) }
            tok => Err(self.err(format!("expected {what}, got {tok:?}"))),
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, got {:?}", expected, self.peek())))
        }
    }

    // ── Directive ─────────────────────────────────────────────────────────

    /// Parses `name { fields } ;?` right after a `#marker`.
    fn parse_directive(&mut self, hash: &TokenWithPos, marker_end: usize) -> Result<BlockDirective, ParseError> {
        let name = self.expect_ident("a block name")?;
        self.expect_token(&Token::LBrace)?;
        let fields = self.parse_fields()?;

        let body_end = self.current().map(|t| t.end).unwrap_or(marker_end);
        self.expect_token(&Token::RBrace)?;

        let terminated = self.peek() == &Token::Semi;
        if terminated {
            self.advance();
        }

        Ok(BlockDirective {
            name,
            fields,
            marker: hash.start..marker_end,
            body_end,
            terminated,
            line: hash.line,
            col: hash.col,
        })
    }

    // ── Fields ────────────────────────────────────────────────────────────

    /// Parses member declarations up to (not including) the closing `}`.
    fn parse_fields(&mut self) -> Result<Vec<FieldDecl>, ParseError> {
        let mut fields = Vec::new();
        loop {
            match self.peek() {
                Token::RBrace => break,
                Token::Eof => return Err(self.err("unclosed '{' block")),
                _ => self.parse_declaration(&mut fields)?,
            }
        }
        Ok(fields)
    }

    /// `qualifier* type declarator (',' declarator)* ';'`
    fn parse_declaration(&mut self, out: &mut Vec<FieldDecl>) -> Result<(), ParseError> {
        self.skip_qualifiers()?;

        let ty = self.expect_ident("a member type")?;
        if ty == "struct" {
            return Err(self.err("inline struct definitions are not supported; declare the struct before the block"));
        }
        if self.peek() == &Token::LBracket {
            return Err(self.err(format!("array size on type '{ty}' is not supported; put it on the member name")));
        }

        loop {
            let line = self.current_pos().0;
            let name = self.expect_ident("a member name")?;
            let array = self.parse_array_len()?;
            out.push(FieldDecl { ty: ty.clone(), name, array, line });

            match self.advance() {
                Token::Comma => continue,
                Token::Semi => break,
                tok => return Err(self.err(format!("expected ',' or ';' after member, got {tok:?}"))),
            }
        }
        Ok(())
    }

    fn skip_qualifiers(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Token::Ident(q) if MEMBER_QUALIFIERS.contains(&q.as_str()) => {
                    self.advance();
                }
                Token::Ident(q) if q == "layout" && self.peek_ahead(1) == &Token::LParen => {
                    self.advance(); // `layout`
                    self.advance(); // `(`
                    loop {
                        match self.advance() {
                            Token::RParen => break,
                            Token::Eof => return Err(self.err("unclosed layout qualifier")),
                            _ => {}
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_array_len(&mut self) -> Result<Option<ArrayLen>, ParseError> {
        if self.peek() != &Token::LBracket {
            return Ok(None);
        }
        self.advance(); // consume `[`

        let len = match self.advance() {
            Token::RBracket => return self.finish_array(ArrayLen::Runtime),
            Token::Number(n) => match parse_int_literal(&n) {
                Some(v) => ArrayLen::Fixed(v),
                None => return Err(self.err(format!("array length '{n}' is not an integer"))),
            },
            Token::Ident(c) => ArrayLen::Constant(c),
            tok => return Err(self.err(format!("expected an array length, got {tok:?}"))),
        };
        self.expect_token(&Token::RBracket)?;
        self.finish_array(len)
    }

    fn finish_array(&self, len: ArrayLen) -> Result<Option<ArrayLen>, ParseError> {
        if self.peek() == &Token::LBracket {
            return Err(self.err("multi-dimensional arrays are not supported"));
        }
        Ok(Some(len))
    }

    // ── Declarations ──────────────────────────────────────────────────────

    /// `struct Name { fields } ;` with the parser positioned after `struct`.
    fn parse_struct(&mut self) -> Result<StructDecl, ParseError> {
        let line = self.current_pos().0;
        let name = self.expect_ident("a struct name")?;
        self.expect_token(&Token::LBrace)?;
        let fields = self.parse_fields()?;
        self.expect_token(&Token::RBrace)?;
        Ok(StructDecl { name, fields, line })
    }

    /// `const int|uint NAME = <int> ;` with the parser positioned after `const`.
    fn parse_const(&mut self) -> Option<(String, u64)> {
        let Token::Ident(ty) = self.advance() else { return None };
        if ty != "int" && ty != "uint" {
            return None;
        }
        let Token::Ident(name) = self.advance() else { return None };
        if self.advance() != Token::Eq {
            return None;
        }
        let Token::Number(n) = self.advance() else { return None };
        if self.peek() != &Token::Semi {
            return None;
        }
        parse_int_literal(&n).map(|v| (name, v))
    }

    /// `#define NAME <int>` with the parser positioned after `define`.
    fn parse_define(&mut self, line: usize) -> Option<(String, u64)> {
        let name_tok = self.current()?;
        let Token::Ident(name) = &name_tok.token else { return None };
        if name_tok.line != line {
            return None;
        }
        self.advance();
        let value_tok = self.current()?;
        let Token::Number(n) = &value_tok.token else { return None };
        if value_tok.line != line {
            return None;
        }
        self.advance();
        parse_int_literal(n).map(|v| (name.clone(), v))
    }
}

// ── Public entry points ───────────────────────────────────────────────────

/// Tokenizes `src`; shorthand for [`Lexer::tokenize`].
pub fn tokenize(src: &str) -> Vec<TokenWithPos> {
    Lexer::new(src).tokenize()
}

/// Finds and parses every `#<marker> name { ... }` directive, in source order.
///
/// A marker is only recognised when `#` is the first token on its line and the
/// marker word follows it directly (`#ssbo`, not `# ssbo`).
pub fn parse_directives(tokens: &[TokenWithPos], marker: &str) -> Result<Vec<BlockDirective>, ParseError> {
    let mut directives = Vec::new();
    let mut i = 0;
    while i + 1 < tokens.len() {
        let hash = &tokens[i];
        let word = &tokens[i + 1];
        let is_marker = hash.token == Token::Hash
            && hash.line_start
            && word.start == hash.end
            && matches!(&word.token, Token::Ident(w) if w == marker);

        if !is_marker {
            i += 1;
            continue;
        }

        let mut parser = Parser::at(tokens, i + 2);
        directives.push(parser.parse_directive(hash, word.end)?);
        i = parser.pos;
    }
    Ok(directives)
}

/// Collects struct declarations and integer constants that block layouts may reference.
///
/// Declarations this crate cannot parse are skipped rather than reported: they only
/// matter if a block uses them, and that surfaces as an unsupported field type.
pub fn collect_declarations(tokens: &[TokenWithPos]) -> Declarations {
    let mut decls = Declarations::default();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        match &tok.token {
            Token::Ident(kw) if kw == "struct" => {
                let mut parser = Parser::at(tokens, i + 1);
                if let Ok(decl) = parser.parse_struct() {
                    decls.structs.insert(decl.name.clone(), decl);
                    i = parser.pos;
                    continue;
                }
            }
            Token::Ident(kw) if kw == "const" => {
                let mut parser = Parser::at(tokens, i + 1);
                if let Some((name, value)) = parser.parse_const() {
                    decls.constants.insert(name, value);
                }
            }
            Token::Hash if tok.line_start => {
                let is_define = matches!(
                    tokens.get(i + 1),
                    Some(TokenWithPos { token: Token::Ident(w), line, .. }) if w == "define" && *line == tok.line
                );
                if is_define {
                    let mut parser = Parser::at(tokens, i + 2);
                    if let Some((name, value)) = parser.parse_define(tok.line) {
                        decls.constants.insert(name, value);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    decls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directives(src: &str, marker: &str) -> Vec<BlockDirective> {
        parse_directives(&tokenize(src), marker).unwrap()
    }

    fn err(src: &str) -> ParseError {
        parse_directives(&tokenize(src), "ssbo").unwrap_err()
    }

    // ── directives ────────────────────────────────────────────────────────

    #[test]
    fn single_directive() {
        let src = "#ssbo matrices\n{\n    mat4 a;\n    vec4 b;\n};\n";
        let d = &directives(src, "ssbo")[0];
        assert_eq!(d.name, "matrices");
        assert_eq!(d.fields.len(), 2);
        assert_eq!(d.fields[0].ty, "mat4");
        assert_eq!(d.fields[1].name, "b");
        assert_eq!(&src[d.marker.clone()], "#ssbo");
        assert_eq!(&src[..d.body_end], "#ssbo matrices\n{\n    mat4 a;\n    vec4 b;\n}");
        assert!(d.terminated);
        assert_eq!((d.line, d.col), (1, 1));
    }

    #[test]
    fn directives_in_source_order() {
        let src = "#ssbo a { float x; };\nvoid f();\n#ssbo b { float y; }\n";
        let ds = directives(src, "ssbo");
        let names: Vec<_> = ds.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(!ds[1].terminated);
        assert_eq!(ds[1].line, 3);
    }

    #[test]
    fn other_markers_are_ignored() {
        let src = "#ubo u { vec4 c; };\n#version 460\n#ssbo_extra x { float y; };";
        assert!(directives(src, "ssbo").is_empty());
        assert_eq!(directives(src, "ubo").len(), 1);
    }

    #[test]
    fn marker_must_start_its_line() {
        assert!(directives("int x; #ssbo a { float y; };", "ssbo").is_empty());
        assert!(directives("# ssbo a { float y; };", "ssbo").is_empty());
    }

    #[test]
    fn commented_directive_is_ignored() {
        assert!(directives("// #ssbo a { float y; };\n/* #ssbo b { float z; }; */", "ssbo").is_empty());
    }

    #[test]
    fn arrays_and_multiple_declarators() {
        let d = &directives("#ssbo s { vec4 a, b[2]; uint n[N]; float rest[]; };", "ssbo")[0];
        assert_eq!(d.fields.len(), 4);
        assert_eq!(d.fields[0].array, None);
        assert_eq!(d.fields[1].array, Some(ArrayLen::Fixed(2)));
        assert_eq!(d.fields[1].ty, "vec4");
        assert_eq!(d.fields[2].array, Some(ArrayLen::Constant("N".into())));
        assert_eq!(d.fields[3].array, Some(ArrayLen::Runtime));
    }

    #[test]
    fn qualifiers_are_skipped() {
        let d = &directives("#ssbo s { readonly highp vec4 a; layout(offset = 16) float b; };", "ssbo")[0];
        assert_eq!(d.fields[0].ty, "vec4");
        assert_eq!(d.fields[1].ty, "float");
    }

    #[test]
    fn field_lines_are_recorded() {
        let d = &directives("#ssbo s\n{\n  float a;\n  float b;\n};", "ssbo")[0];
        assert_eq!(d.fields[0].line, 3);
        assert_eq!(d.fields[1].line, 4);
    }

    #[test]
    fn err_missing_name() { assert!(err("#ssbo { float x; };").message.contains("block name")); }
    #[test]
    fn err_unclosed_block() { err("#ssbo a { float x;"); }
    #[test]
    fn err_missing_semicolon() { err("#ssbo a { float x }"); }
    #[test]
    fn err_inline_struct() { err("#ssbo a { struct S { float x; } s; };"); }
    #[test]
    fn err_multi_dimensional() { err("#ssbo a { float x[2][2]; };"); }
    #[test]
    fn err_float_length() { err("#ssbo a { float x[2.0]; };"); }

    #[test]
    fn err_reports_position() {
        let e = err("\n#ssbo a\n{\n  float x y;\n};");
        assert_eq!(e.line, 4);
    }

    // ── declarations ──────────────────────────────────────────────────────

    #[test]
    fn collects_structs() {
        let decls = collect_declarations(&tokenize("struct MVP\n{\n mat4 m;\n mat4 v;\n mat4 p;\n};"));
        let mvp = &decls.structs["MVP"];
        assert_eq!(mvp.fields.len(), 3);
        assert_eq!(mvp.line, 1);
    }

    #[test]
    fn collects_constants() {
        let src = "#define MAX_LIGHTS 16\nconst uint COUNT = 4u;\nconst float F = 1.0;\n#define NAME\n";
        let decls = collect_declarations(&tokenize(src));
        assert_eq!(decls.constants.get("MAX_LIGHTS"), Some(&16));
        assert_eq!(decls.constants.get("COUNT"), Some(&4));
        assert!(!decls.constants.contains_key("F"));
        assert!(!decls.constants.contains_key("NAME"));
    }

    #[test]
    fn define_value_must_share_the_line() {
        let decls = collect_declarations(&tokenize("#define EMPTY\n4\n"));
        assert!(decls.constants.is_empty());
    }

    #[test]
    fn unparsable_struct_is_skipped() {
        let decls = collect_declarations(&tokenize("struct Broken { float; };\nstruct Ok { float x; };"));
        assert!(!decls.structs.contains_key("Broken"));
        assert!(decls.structs.contains_key("Ok"));
    }
}
