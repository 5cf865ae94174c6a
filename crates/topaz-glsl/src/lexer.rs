// ── Token ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Ident(String),
    /// Raw numeric literal text, suffixes included (`512`, `4u`, `0.9f`).
    Number(String),
    Str(String),
    // Punctuation
    Hash,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Semi,
    Comma,
    Eq,
    /// Any other single character; the lexer never rejects GLSL it does not understand.
    Punct(char),
    // Sentinel
    Eof,
}

/// A token plus where it came from.
///
/// `start..end` is the byte span in the source; `line_start` is set when the
/// token is the first one on its line (comments and whitespace excluded),
/// which is how preprocessor-style directives are recognised.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithPos {
    pub token: Token,
    pub line: usize,
    pub col: usize,
    pub start: usize,
    pub end: usize,
    pub line_start: bool,
}

// ── Lexer ─────────────────────────────────────────────────────────────────

pub struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    line: usize,
    col: usize,
    at_line_start: bool,
}

impl<'s> Lexer<'s> {
    pub fn new(src: &'s str) -> Self {
        Self { src, pos: 0, line: 1, col: 1, at_line_start: true }
    }

    /// Tokenizes the whole source. The last token is always [`Token::Eof`].
    pub fn tokenize(mut self) -> Vec<TokenWithPos> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let eof = tok.token == Token::Eof;
            tokens.push(tok);
            if eof {
                break;
            }
        }
        tokens
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.src[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
            self.at_line_start = true;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.advance();
            }
            // skip `//` line comments
            if self.src[self.pos..].starts_with("//") {
                while !matches!(self.peek(), None | Some('\n')) {
                    self.advance();
                }
            // skip `/* */` block comments
            } else if self.src[self.pos..].starts_with("/*") {
                self.advance(); self.advance(); // consume `/*`
                loop {
                    if self.src[self.pos..].starts_with("*/") {
                        self.advance(); self.advance(); // consume `*/`
                        break;
                    }
                    if self.advance().is_none() {
                        break; // unterminated; left for the real compiler to report
                    }
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> TokenWithPos {
        self.skip_whitespace_and_comments();

        let (line, col, start) = (self.line, self.col, self.pos);
        let line_start = std::mem::replace(&mut self.at_line_start, false);

        let token = match self.peek() {
            None => Token::Eof,
            Some(ch) => match ch {
                '#' => { self.advance(); Token::Hash }
                '{' => { self.advance(); Token::LBrace }
                '}' => { self.advance(); Token::RBrace }
                '[' => { self.advance(); Token::LBracket }
                ']' => { self.advance(); Token::RBracket }
                '(' => { self.advance(); Token::LParen }
                ')' => { self.advance(); Token::RParen }
                ';' => { self.advance(); Token::Semi }
                ',' => { self.advance(); Token::Comma }
                '=' => { self.advance(); Token::Eq }
                '"' => self.lex_string(),
                c if c.is_ascii_digit() => self.lex_number(),
                '.' if self.src[self.pos + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
                    self.lex_number()
                }
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                other => { self.advance(); Token::Punct(other) }
            },
        };

        TokenWithPos { token, line, col, start, end: self.pos, line_start }
    }

    fn lex_string(&mut self) -> Token {
        self.advance(); // consume opening `"`
        let mut s = String::new();
        // GLSL has no escapes; an unterminated string stops at the end of the line.
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
            if c == '"' {
                break;
            }
            s.push(c);
        }
        Token::Str(s)
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '.' || c == '_') {
            self.advance();
        }
        Token::Number(self.src[start..self.pos].to_string())
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        Token::Ident(self.src[start..self.pos].to_string())
    }
}

/// Parses an integer literal as GLSL writes it: decimal, hex (`0x`), or octal
/// (leading `0`), with an optional `u`/`U` suffix.
pub fn parse_int_literal(text: &str) -> Option<u64> {
    let digits = text.strip_suffix(['u', 'U']).unwrap_or(text);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}
