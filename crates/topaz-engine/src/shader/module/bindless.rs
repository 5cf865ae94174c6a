use topaz_glsl::lexer::{Token, TokenWithPos};
use topaz_glsl::tokenize;

/// The placeholder type shader authors write for a bindless sampler.
pub const BINDLESS_SAMPLER_TYPE: &str = "tz_bindless_sampler";

const BINDLESS_EXTENSION: &str = "GL_ARB_bindless_texture";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindlessSamplerConfig {
    /// GLSL type that replaces `tz_bindless_sampler`.
    pub sampler_type: String,
    /// Insert `#extension GL_ARB_bindless_texture : require` when the source uses
    /// bindless samplers and does not enable the extension itself.
    pub require_extension: bool,
}

impl Default for BindlessSamplerConfig {
    fn default() -> Self {
        Self { sampler_type: "sampler2D".to_string(), require_extension: true }
    }
}

/// Rewrites `tz_bindless_sampler` into an opaque sampler type.
///
/// Registers nothing; the 64-bit handles live in whatever `#ssbo` / `#ubo`
/// block declares the field.
#[derive(Debug, Clone, Default)]
pub struct BindlessSamplerModule {
    config: BindlessSamplerConfig,
    last_replaced: usize,
}

impl BindlessSamplerModule {
    pub fn new(config: BindlessSamplerConfig) -> Self {
        Self { config, last_replaced: 0 }
    }

    /// Identifiers replaced by the most recent pass.
    pub fn replaced(&self) -> usize {
        self.last_replaced
    }

    pub fn apply(&mut self, source: &mut String) {
        let tokens = tokenize(source);
        let spans: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(&t.token, Token::Ident(id) if id == BINDLESS_SAMPLER_TYPE))
            .map(|t| t.start..t.end)
            .collect();

        self.last_replaced = spans.len();
        if spans.is_empty() {
            return;
        }
        for span in spans.into_iter().rev() {
            source.replace_range(span, &self.config.sampler_type);
        }

        if self.config.require_extension {
            let tokens = tokenize(source);
            if !enables_extension(&tokens) {
                let at = extension_insert_point(source, &tokens);
                source.insert_str(at, &format!("#extension {BINDLESS_EXTENSION} : require\n"));
                if at > 0 && !source[..at].ends_with('\n') {
                    source.insert(at, '\n');
                }
            }
        }
        log::debug!("replaced {} bindless sampler(s)", self.last_replaced);
    }
}

/// Index of the first token of each `#word` directive line, with the word.
fn directive_lines<'t>(tokens: &'t [TokenWithPos]) -> impl Iterator<Item = (usize, &'t str)> + 't {
    tokens.windows(2).enumerate().filter_map(|(i, pair)| match (&pair[0].token, &pair[1].token) {
        (Token::Hash, Token::Ident(word)) if pair[0].line_start && pair[1].line == pair[0].line => {
            Some((i, word.as_str()))
        }
        _ => None,
    })
}

fn enables_extension(tokens: &[TokenWithPos]) -> bool {
    directive_lines(tokens).any(|(i, word)| {
        word == "extension"
            && matches!(tokens.get(i + 2).map(|t| &t.token), Some(Token::Ident(ext)) if ext == BINDLESS_EXTENSION)
    })
}

/// Byte offset just past the `#version` line, or 0 without one.
fn extension_insert_point(source: &str, tokens: &[TokenWithPos]) -> usize {
    let Some((i, _)) = directive_lines(tokens).find(|(_, word)| *word == "version") else {
        return 0;
    };
    let start = tokens[i].start;
    source[start..].find('\n').map_or(source.len(), |nl| start + nl + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(src: &str) -> (String, usize) {
        let mut module = BindlessSamplerModule::default();
        let mut s = src.to_string();
        module.apply(&mut s);
        (s, module.replaced())
    }

    #[test]
    fn replaces_identifiers_and_adds_extension() {
        let (out, n) = apply("#version 460\nbuffer b { tz_bindless_sampler textures[2]; };\n");
        assert_eq!(n, 1);
        assert_eq!(
            out,
            "#version 460\n#extension GL_ARB_bindless_texture : require\nbuffer b { sampler2D textures[2]; };\n"
        );
    }

    #[test]
    fn existing_extension_is_kept() {
        let src = "#version 460\n#extension GL_ARB_bindless_texture : enable\ntz_bindless_sampler s;\n";
        let (out, _) = apply(src);
        assert_eq!(out.matches("GL_ARB_bindless_texture").count(), 1);
        assert!(out.contains("sampler2D s;"));
    }

    #[test]
    fn untouched_without_bindless_samplers() {
        let src = "#version 460\nvoid main() {}\n";
        assert_eq!(apply(src), (src.to_string(), 0));
    }

    #[test]
    fn longer_identifiers_and_comments_are_ignored() {
        let src = "tz_bindless_sampler_count x; // tz_bindless_sampler\n";
        assert_eq!(apply(src), (src.to_string(), 0));
    }

    #[test]
    fn no_version_line_puts_extension_first() {
        let (out, _) = apply("tz_bindless_sampler s;");
        assert_eq!(out, "#extension GL_ARB_bindless_texture : require\nsampler2D s;");
    }

    #[test]
    fn version_without_trailing_newline() {
        let mut module = BindlessSamplerModule::new(BindlessSamplerConfig {
            sampler_type: "usampler2D".into(),
            require_extension: true,
        });
        let mut s = "tz_bindless_sampler a; tz_bindless_sampler b;\n#version 460".to_string();
        module.apply(&mut s);
        assert_eq!(module.replaced(), 2);
        assert_eq!(
            s,
            "usampler2D a; usampler2D b;\n#version 460\n#extension GL_ARB_bindless_texture : require\n"
        );
    }

    #[test]
    fn extension_can_be_left_to_the_author() {
        let mut module = BindlessSamplerModule::new(BindlessSamplerConfig {
            require_extension: false,
            ..Default::default()
        });
        let mut s = "#version 460\ntz_bindless_sampler s;".to_string();
        module.apply(&mut s);
        assert_eq!(s, "#version 460\nsampler2D s;");
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let (once, _) = apply("#version 460\ntz_bindless_sampler s;\n");
        let (twice, n) = apply(&once);
        assert_eq!(once, twice);
        assert_eq!(n, 0);
    }
}
