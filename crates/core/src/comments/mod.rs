//! Comment scrubbing.

use rand::rngs::StdRng;
use rand::Rng;

use crate::guard::SENTINEL_STEM;
use crate::pipeline::{SkippedItem, Stage};
use crate::source::Span;
use crate::token::{tokenize, TokenKind};

const FILLER_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const BLOCK_FILLER_LEN: usize = 12;
const LINE_FILLER_LEN: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct CommentOutcome {
    pub text: String,
    pub replaced: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Replace every comment with random filler. Line structure is kept: a block
/// comment's newlines follow its replacement, or stay inside it on directive
/// lines where a bare newline would end the directive.
pub fn sanitize(text: &str, rng: &mut StdRng) -> CommentOutcome {
    let tokens = tokenize(text);
    let mut replacements: Vec<(Span, String)> = Vec::new();
    for token in tokens.iter().filter(|t| t.kind == TokenKind::Comment) {
        let raw = token.text(text);
        if !token.terminated || raw.contains(SENTINEL_STEM) {
            continue;
        }
        let replacement = if let Some(body) = raw.strip_prefix("/*") {
            let body = body.strip_suffix("*/").unwrap_or(body);
            let newlines = body.matches('\n').count();
            let width = body.chars().filter(|c| *c != '\n' && *c != '\r').count().min(BLOCK_FILLER_LEN);
            let filler = filler(width, rng);
            if token.directive && newlines > 0 {
                format!("/*{filler}{}*/", "\n".repeat(newlines))
            } else {
                format!("/*{filler}*/{}", "\n".repeat(newlines))
            }
        } else {
            // A spliced line comment would leave its continuation lines as code.
            if raw.contains('\n') {
                continue;
            }
            let width = raw.chars().count().saturating_sub(2).min(LINE_FILLER_LEN);
            format!("//{}", filler(width, rng))
        };
        replacements.push((token.span, replacement));
    }
    let spliced = crate::literal::splice(text, &replacements);
    let skipped: Vec<SkippedItem> = spliced
        .rejected
        .iter()
        .map(|span| SkippedItem::new(Stage::Comments, *span, "overlapping replacement"))
        .collect();
    let replaced = replacements.len() - skipped.len();
    tracing::debug!(replaced, "sanitized comments");
    CommentOutcome { text: spliced.text, replaced, skipped }
}

fn filler(width: usize, rng: &mut StdRng) -> String {
    (0..width).map(|_| FILLER_ALPHABET[rng.gen_range(0..FILLER_ALPHABET.len())] as char).collect()
}
