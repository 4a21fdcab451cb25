use std::collections::BTreeSet;

use crate::guard::SENTINEL_STEM;
use crate::lexicon;
use crate::token::{directive_names, Token, TokenKind};

/// Prefix of renamed identifiers.
pub const RENAME_PREFIX: &str = "z_";
/// Prefix of the synthesized string decoder.
pub const DECODER_PREFIX: &str = "dec_";
/// Prefix of synthesized dead functions.
pub const DEAD_PREFIX: &str = "zdead_";

pub const HELPER_PREFIXES: &[&str] = &[RENAME_PREFIX, DECODER_PREFIX, DEAD_PREFIX];

/// Decides which names may never become rename candidates.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    preserve: BTreeSet<String>,
    macros: BTreeSet<String>,
}

impl NameFilter {
    pub fn new<I, S>(preserve: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { preserve: preserve.into_iter().map(Into::into).collect(), macros: BTreeSet::new() }
    }

    /// Also exclude every name `#define`d in the unit.
    pub fn with_macros(mut self, src: &str, tokens: &[Token]) -> Self {
        self.macros.extend(defined_macros(src, tokens));
        self
    }

    pub fn excludes(&self, name: &str) -> bool {
        name.is_empty()
            || lexicon::is_keyword(name)
            || lexicon::is_directive_word(name)
            || lexicon::is_library_name(name)
            || lexicon::is_library_type(name)
            || lexicon::is_all_caps(name)
            || name.starts_with("__")
            || name.contains(SENTINEL_STEM)
            || HELPER_PREFIXES.iter().any(|p| name.starts_with(p))
            || self.preserve.contains(name)
            || self.macros.contains(name)
    }
}

/// Names introduced by `#define NAME` lines.
pub fn defined_macros(src: &str, tokens: &[Token]) -> BTreeSet<String> {
    let names = directive_names(src, tokens);
    let mut out = BTreeSet::new();
    let mut idents_on_line = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.opens_directive {
            idents_on_line = 0;
        }
        if token.kind != TokenKind::Identifier {
            continue;
        }
        idents_on_line += 1;
        // `define` is the first identifier, the macro name the second.
        if idents_on_line == 2 && names[i] == Some("define") {
            out.insert(token.text(src).to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    #[test]
    fn excludes_reserved_and_configured_names() {
        let src = "#define LIMIT 4\n#  define square(x) ((x)*(x))\nint value;";
        let tokens = tokenize(src);
        let filter = NameFilter::new(["keep_me"]).with_macros(src, &tokens);
        for name in ["main", "printf", "while", "LIMIT", "__hidden", "z_abc", "dec_xyz", "keep_me", "square", "size_t"] {
            assert!(filter.excludes(name), "{name} should be excluded");
        }
        assert!(!filter.excludes("value"));
        assert!(!filter.excludes("Node"));
    }
}
