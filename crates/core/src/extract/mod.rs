//! Fact extraction: which identifiers of a unit are safe to rename.
//!
//! Two strategies produce the same output. The structural one asks a
//! `DeclarationParser` for a declaration tree; the token one recognizes
//! declarations from token patterns. A structural failure falls back to the
//! token strategy and the reason is kept on the `Extraction`.

mod denylist;
mod fallback;
pub mod structural;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::{tokenize, usable_token_count, CodeView, Token, TokenKind};

pub use denylist::{
    defined_macros, NameFilter, DEAD_PREFIX, DECODER_PREFIX, HELPER_PREFIXES, RENAME_PREFIX,
};
pub use structural::{
    DeclKind, DeclNode, DeclarationParser, DeclarationTree, ParseError, ParseOptions,
};

/// Share of non-whitespace tokens that may be unclassifiable before the unit
/// is declared unreadable.
const MAX_INVALID_RATIO: f64 = 0.05;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("source is unreadable: {0}")]
    UnreadableSource(String),
}

/// What a declaration introduces a name as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolRole {
    Function,
    Variable,
    Parameter,
    Field,
    Type,
    EnumConstant,
}

/// A name declared in the unit that the rename engine may rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolCandidate {
    pub name: String,
    pub roles: BTreeSet<SymbolRole>,
    /// Declarations seen for this name.
    pub declarations: usize,
    /// Identifier tokens with this name anywhere in the unit.
    pub occurrences: usize,
}

impl SymbolCandidate {
    pub fn has_role(&self, role: SymbolRole) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Structural,
    TokenBased,
}

/// Declaration-tree strategy backed by a parser.
pub struct StructuralStrategy {
    pub parser: Arc<dyn DeclarationParser>,
    pub options: ParseOptions,
}

/// Token-pattern strategy; needs no collaborators.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenStrategy;

pub enum Strategy {
    Structural(StructuralStrategy),
    TokenBased(TokenStrategy),
}

impl Strategy {
    pub fn structural<P: DeclarationParser + 'static>(parser: P, options: ParseOptions) -> Self {
        Strategy::Structural(StructuralStrategy { parser: Arc::new(parser), options })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Structural(_) => StrategyKind::Structural,
            Strategy::TokenBased(_) => StrategyKind::TokenBased,
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::TokenBased(TokenStrategy)
    }
}

/// Output of one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Strategy that produced `candidates`.
    pub strategy: StrategyKind,
    /// Why the structural strategy was abandoned, when it was.
    pub fallback_reason: Option<String>,
    /// Candidates ordered by name.
    pub candidates: Vec<SymbolCandidate>,
    /// Every identifier spelled in the unit.
    #[serde(skip)]
    pub identifiers: BTreeSet<String>,
}

impl Extraction {
    pub fn candidate(&self, name: &str) -> Option<&SymbolCandidate> {
        self.candidates.iter().find(|c| c.name == name)
    }
}

pub struct FactExtractor {
    strategy: Strategy,
    filter: NameFilter,
}

impl FactExtractor {
    pub fn new(strategy: Strategy, filter: NameFilter) -> Self {
        Self { strategy, filter }
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Extract rename candidates from `text`.
    pub fn extract(&self, text: &str) -> Result<Extraction, ExtractError> {
        let tokens = tokenize(text);
        check_readable(text, &tokens)?;
        let filter = self.filter.clone().with_macros(text, &tokens);

        let (strategy, fallback_reason, declarations) = match &self.strategy {
            Strategy::Structural(structural) => {
                match structural.parser.parse(text, &structural.options) {
                    Ok(tree) => (StrategyKind::Structural, None, tree.declarations()),
                    Err(err) => {
                        tracing::warn!(
                            parser = structural.parser.name(),
                            error = %err,
                            "structural extraction failed; falling back to token patterns"
                        );
                        (StrategyKind::TokenBased, Some(err.to_string()), token_declarations(text, &tokens))
                    }
                }
            }
            Strategy::TokenBased(_) => (StrategyKind::TokenBased, None, token_declarations(text, &tokens)),
        };

        let occurrences = identifier_counts(text, &tokens);
        let candidates = merge_candidates(declarations, &occurrences, &filter);
        tracing::debug!(
            strategy = ?strategy,
            candidates = candidates.len(),
            "extracted rename candidates"
        );
        Ok(Extraction {
            strategy,
            fallback_reason,
            candidates,
            identifiers: occurrences.into_keys().collect(),
        })
    }
}

fn token_declarations(text: &str, tokens: &[Token]) -> Vec<(String, SymbolRole)> {
    let view = CodeView::new(text, tokens);
    fallback::scan(&view)
}

fn identifier_counts(text: &str, tokens: &[Token]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for token in tokens.iter().filter(|t| t.kind == TokenKind::Identifier) {
        *counts.entry(token.text(text).to_string()).or_insert(0) += 1;
    }
    counts
}

/// Collapse same-name declarations, drop excluded names and names that are
/// never spelled in the unit.
fn merge_candidates(
    declarations: Vec<(String, SymbolRole)>,
    occurrences: &BTreeMap<String, usize>,
    filter: &NameFilter,
) -> Vec<SymbolCandidate> {
    let mut merged: BTreeMap<String, SymbolCandidate> = BTreeMap::new();
    for (name, role) in declarations {
        if filter.excludes(&name) {
            continue;
        }
        let Some(&count) = occurrences.get(&name) else { continue };
        let entry = merged.entry(name.clone()).or_insert_with(|| SymbolCandidate {
            name,
            roles: BTreeSet::new(),
            declarations: 0,
            occurrences: count,
        });
        entry.roles.insert(role);
        entry.declarations += 1;
    }
    merged.into_values().collect()
}

/// Reject inputs that are not C text: NUL bytes, mostly unclassifiable bytes,
/// or non-blank text without a single usable token.
pub fn check_readable(text: &str, tokens: &[Token]) -> Result<(), ExtractError> {
    if text.contains('\0') {
        return Err(ExtractError::UnreadableSource("input contains NUL bytes".into()));
    }
    let non_blank = tokens.iter().filter(|t| t.kind != TokenKind::Whitespace).count();
    if non_blank == 0 {
        return Ok(());
    }
    if usable_token_count(tokens) == 0 {
        return Err(ExtractError::UnreadableSource("no usable tokens".into()));
    }
    let invalid = tokens.iter().filter(|t| t.kind == TokenKind::Invalid).count();
    if invalid as f64 > non_blank as f64 * MAX_INVALID_RATIO {
        return Err(ExtractError::UnreadableSource(format!(
            "{invalid} of {non_blank} tokens are not C"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingParser;

    impl DeclarationParser for FailingParser {
        fn parse(&self, _text: &str, _options: &ParseOptions) -> Result<DeclarationTree, ParseError> {
            Err(ParseError::Unavailable("no front end".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn structural_failure_falls_back_to_tokens() {
        let extractor = FactExtractor::new(
            Strategy::structural(FailingParser, ParseOptions::default()),
            NameFilter::default(),
        );
        let extraction = extractor.extract("int counter = 1;\nint main(void) { return counter; }\n").expect("extract");
        assert_eq!(extraction.strategy, StrategyKind::TokenBased);
        assert!(extraction.fallback_reason.as_deref().is_some_and(|r| r.contains("no front end")));
        let counter = extraction.candidate("counter").expect("counter");
        assert_eq!(counter.occurrences, 2);
        assert!(extraction.candidate("main").is_none());
    }

    #[test]
    fn same_name_declarations_merge_roles() {
        let extractor = FactExtractor::new(Strategy::default(), NameFilter::default());
        let extraction = extractor
            .extract("struct item { int size; };\nint measure(int size) { return size; }\n")
            .expect("extract");
        let size = extraction.candidate("size").expect("size");
        assert!(size.has_role(SymbolRole::Field));
        assert!(size.has_role(SymbolRole::Parameter));
        assert_eq!(size.declarations, 2);
        assert_eq!(size.occurrences, 3);
    }

    #[test]
    fn unreadable_inputs_are_rejected() {
        let extractor = FactExtractor::new(Strategy::default(), NameFilter::default());
        assert!(extractor.extract("int a;\0").is_err());
        assert!(extractor.extract("@@@@ ``` @@").is_err());
        assert!(extractor.extract("   \n\t").is_ok());
    }
}
