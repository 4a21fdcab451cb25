//! Consistent identifier renaming.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{SymbolCandidate, SymbolRole};
use crate::lexicon;
use crate::token::{directive_names, tokenize, Token, TokenKind};

const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const DEFAULT_SUFFIX_LEN: usize = 8;
pub const MAX_NAME_ATTEMPTS: usize = 64;

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("could not generate a fresh name with prefix `{prefix}` after {attempts} attempts")]
    CollisionExhaustion { prefix: String, attempts: usize },
}

/// Issues synthetic names that collide with nothing already in the unit and
/// with nothing issued before.
#[derive(Debug, Clone)]
pub struct NameRegistry {
    taken: BTreeSet<String>,
    suffix_len: usize,
}

impl NameRegistry {
    /// `identifiers` are every name spelled in the unit.
    pub fn new<'a, I>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        Self { taken: identifiers.into_iter().cloned().collect(), suffix_len: DEFAULT_SUFFIX_LEN }
    }

    pub fn with_suffix_len(mut self, len: usize) -> Self {
        self.suffix_len = len.max(1);
        self
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// `<prefix><suffix>` with a random `[a-z0-9]` suffix.
    pub fn fresh(&mut self, prefix: &str, rng: &mut StdRng) -> Result<String, RenameError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let suffix: String = (0..self.suffix_len)
                .map(|_| NAME_ALPHABET[rng.gen_range(0..NAME_ALPHABET.len())] as char)
                .collect();
            let name = format!("{prefix}{suffix}");
            if self.taken.contains(&name)
                || lexicon::is_keyword(&name)
                || lexicon::is_library_name(&name)
            {
                continue;
            }
            self.taken.insert(name.clone());
            return Ok(name);
        }
        Err(RenameError::CollisionExhaustion {
            prefix: prefix.to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

/// Injective original-to-synthetic name map for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameMapping {
    pairs: BTreeMap<String, String>,
    /// Names that may also be renamed after `.` / `->`.
    members: BTreeSet<String>,
}

impl RenameMapping {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &BTreeMap<String, String> {
        &self.pairs
    }

    pub fn renames_members(&self, name: &str) -> bool {
        self.members.contains(name)
    }
}

/// Pick `round(coverage * n)` candidates at random and assign each a fresh name.
pub fn build_mapping(
    candidates: &[SymbolCandidate],
    registry: &mut NameRegistry,
    prefix: &str,
    coverage: f64,
    rng: &mut StdRng,
) -> Result<RenameMapping, RenameError> {
    let mut ordered: Vec<&SymbolCandidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));
    ordered.shuffle(rng);
    let take = (coverage.clamp(0.0, 1.0) * ordered.len() as f64).round() as usize;

    let mut mapping = RenameMapping::default();
    for candidate in ordered.into_iter().take(take) {
        let target = registry.fresh(prefix, rng)?;
        if candidate.has_role(SymbolRole::Field) {
            mapping.members.insert(candidate.name.clone());
        }
        mapping.pairs.insert(candidate.name.clone(), target);
    }
    tracing::debug!(renamed = mapping.len(), candidates = candidates.len(), "built rename mapping");
    Ok(mapping)
}

/// Rewrite identifier tokens that are mapping keys.
pub fn apply(text: &str, mapping: &RenameMapping) -> String {
    if mapping.is_empty() {
        return text.to_string();
    }
    let tokens = tokenize(text);
    let parameter_uses = macro_parameter_uses(text, &tokens);
    let mut out = String::with_capacity(text.len());
    let mut prev_code: Option<&Token> = None;
    for (index, token) in tokens.iter().enumerate() {
        let piece = token.text(text);
        let replacement = (token.kind == TokenKind::Identifier)
            .then(|| mapping.get(piece))
            .flatten()
            .filter(|_| parameter_uses[index] || renamable_here(text, piece, prev_code, mapping));
        out.push_str(replacement.unwrap_or(piece));
        if token.is_code() {
            prev_code = Some(token);
        }
    }
    out
}

fn renamable_here(text: &str, name: &str, prev: Option<&Token>, mapping: &RenameMapping) -> bool {
    let Some(prev) = prev else { return true };
    if prev.is_punct(text, ".") || prev.is_punct(text, "->") {
        return mapping.renames_members(name);
    }
    // Directive name: `# define`.
    !prev.opens_directive
}

/// Marks identifiers on function-like `#define` lines that name one of the
/// macro's parameters. Such uses follow the parameter list wherever they sit,
/// including after `.` and `->`.
fn macro_parameter_uses(text: &str, tokens: &[Token]) -> Vec<bool> {
    let names = directive_names(text, tokens);
    let mut marks = vec![false; tokens.len()];
    let mut i = 0;
    while i < tokens.len() {
        if !tokens[i].opens_directive {
            i += 1;
            continue;
        }
        let mut end = i + 1;
        while end < tokens.len() && tokens[end].directive && !tokens[end].opens_directive {
            end += 1;
        }
        let line: Vec<usize> = (i + 1..end).filter(|&j| tokens[j].is_code()).collect();
        i = end;

        let &[_, name, open, ..] = line.as_slice() else { continue };
        let function_like = names[name] == Some("define")
            && tokens[name].kind == TokenKind::Identifier
            && tokens[open].is_punct(text, "(")
            && tokens[open].span.start == tokens[name].span.end;
        if !function_like {
            continue;
        }
        let Some(close) = line.iter().position(|&j| tokens[j].is_punct(text, ")")) else { continue };
        let params: BTreeSet<&str> = line[3..close]
            .iter()
            .map(|&j| &tokens[j])
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text(text))
            .collect();
        for &j in &line[close + 1..] {
            if tokens[j].kind == TokenKind::Identifier && params.contains(tokens[j].text(text)) {
                marks[j] = true;
            }
        }
    }
    marks
}
