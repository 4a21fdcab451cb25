//! String-literal encryption.
//!
//! Eligible literals are XOR-encoded with a per-literal key and replaced by a
//! call to a decoder that is synthesized once per unit:
//!
//! ```c
//! dec_xxxxxxxx((const unsigned char[]){0x2a,0x2f,0x2b}, 0x2b)
//! ```
//!
//! The array carries the encoded terminator, so the decoder stops at the first
//! byte that decodes to NUL.

mod escape;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::guard::SENTINEL_STEM;
use crate::pipeline::{SkippedItem, Stage};
use crate::source::Span;
use crate::token::{tokenize, BraceKind, CodeView, TokenKind};

pub use escape::{decode_body, Decoded, EncodingError};

/// Tokens after which a literal starts an expression operand.
const ALLOWED_PREDECESSORS: &[&str] = &[
    "(", ",", "=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", "?", ":", "{",
    ";", "}",
];

/// One encrypted literal (or run of adjacent literals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralEncryptionEntry {
    pub original_bytes: Vec<u8>,
    /// Encoded bytes including the encoded terminator.
    pub encoded_bytes: Vec<u8>,
    pub key: u8,
    pub decoder_name: String,
    /// Span of the replaced literal run in the text the stage saw.
    pub span: Span,
    pub lossy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LiteralOutcome {
    pub text: String,
    pub entries: Vec<LiteralEncryptionEntry>,
    pub skipped: Vec<SkippedItem>,
}

pub fn xor_encode(bytes: &[u8], key: u8) -> Vec<u8> {
    bytes.iter().map(|b| b ^ key).collect()
}

pub fn xor_decode(bytes: &[u8], key: u8) -> Vec<u8> {
    xor_encode(bytes, key)
}

/// Encode `bytes` plus a terminating NUL.
pub fn encode_with_terminator(bytes: &[u8], key: u8) -> Vec<u8> {
    let mut out = xor_encode(bytes, key);
    out.push(key);
    out
}

/// Reference model of the synthesized decoder: XOR until the decoded NUL.
pub fn decode_until_terminator(encoded: &[u8], key: u8) -> Vec<u8> {
    encoded.iter().map(|b| b ^ key).take_while(|b| *b != 0).collect()
}

/// Source of the decoder function.
pub fn decoder_source(name: &str) -> String {
    format!(
        "static char *{name}(const unsigned char *data, unsigned char key)\n\
         {{\n\
         \x20   size_t n = 0, i;\n\
         \x20   char *out;\n\
         \x20   while ((unsigned char)(data[n] ^ key) != 0)\n\
         \x20       n++;\n\
         \x20   out = (char *)malloc(n + 1);\n\
         \x20   if (out == 0)\n\
         \x20       abort();\n\
         \x20   for (i = 0; i <= n; i++)\n\
         \x20       out[i] = (char)(data[i] ^ key);\n\
         \x20   return out;\n\
         }}\n"
    )
}

/// Replace every eligible literal run in `text` with a decoder call.
pub fn encrypt_literals(text: &str, decoder_name: &str, rng: &mut StdRng) -> LiteralOutcome {
    let tokens = tokenize(text);
    let view = CodeView::new(text, &tokens);
    let mut outcome = LiteralOutcome::default();
    let mut replacements: Vec<(Span, String)> = Vec::new();

    let mut ci = 0;
    while ci < view.len() {
        if view.kind(ci) != Some(TokenKind::StringLiteral) {
            ci += 1;
            continue;
        }
        let first = ci;
        let last = run_end(&view, first);
        let span = literal_span(&view, first, last);
        let eligible = is_eligible(&view, first, last);
        ci = last + 1;
        if !eligible {
            continue;
        }

        let mut decoded = Decoded::default();
        let mut unterminated = false;
        for token in &tokens[view.code[first]..=view.code[last]] {
            if token.kind != TokenKind::StringLiteral {
                continue;
            }
            unterminated |= !token.terminated;
            let raw = token.text(text);
            let body = raw.get(1..raw.len().saturating_sub(1)).unwrap_or("");
            let part = decode_body(body);
            decoded.bytes.extend(part.bytes);
            decoded.errors.extend(part.errors);
        }
        if unterminated {
            outcome.skipped.push(SkippedItem::new(Stage::Literals, span, "unterminated literal"));
            continue;
        }
        if decoded.bytes.contains(&0) {
            outcome.skipped.push(SkippedItem::new(Stage::Literals, span, "literal contains NUL"));
            continue;
        }
        for err in &decoded.errors {
            tracing::warn!(span = %span, error = %err, "kept escape verbatim");
        }

        let key: u8 = rng.gen_range(1..=255);
        let encoded = encode_with_terminator(&decoded.bytes, key);
        replacements.push((span, render_call(decoder_name, &encoded, key)));
        outcome.entries.push(LiteralEncryptionEntry {
            lossy: decoded.lossy(),
            original_bytes: decoded.bytes,
            encoded_bytes: encoded,
            key,
            decoder_name: decoder_name.to_string(),
            span,
        });
    }

    let spliced = splice(text, &replacements);
    outcome.text = spliced.text;
    for span in spliced.rejected {
        outcome.entries.retain(|e| e.span != span);
        outcome.skipped.push(SkippedItem::new(Stage::Literals, span, "overlapping replacement"));
    }
    tracing::debug!(
        encrypted = outcome.entries.len(),
        skipped = outcome.skipped.len(),
        "encrypted string literals"
    );
    outcome
}

fn render_call(decoder: &str, encoded: &[u8], key: u8) -> String {
    let bytes: Vec<String> = encoded.iter().map(|b| format!("0x{b:02x}")).collect();
    format!("{decoder}((const unsigned char[]){{{}}}, 0x{key:02x})", bytes.join(","))
}

/// Last code index of the run of adjacent string literals starting at `first`.
/// Directive lines between two literals break the run.
fn run_end(view: &CodeView<'_>, first: usize) -> usize {
    let mut last = first;
    while view.kind(last + 1) == Some(TokenKind::StringLiteral) {
        let (a, b) = (view.code[last], view.code[last + 1]);
        if view.tokens[a + 1..b].iter().any(|t| t.directive) {
            break;
        }
        last += 1;
    }
    last
}

fn literal_span(view: &CodeView<'_>, first: usize, last: usize) -> Span {
    let start = view.token(first).map(|t| t.span.start).unwrap_or(0);
    let end = view.token(last).map(|t| t.span.end).unwrap_or(start);
    Span::new(start, end)
}

/// Literal-placement policy. Conservative: a literal is only replaced where an
/// ordinary `char *` expression is certain to be accepted.
fn is_eligible(view: &CodeView<'_>, first: usize, last: usize) -> bool {
    let Some(scope) = view.scope(first) else { return false };
    if !scope.in_function
        || scope.restricted
        || !matches!(scope.innermost, Some(BraceKind::FunctionBody | BraceKind::Block))
    {
        return false;
    }
    if (first..=last).any(|ci| !view.text(ci).starts_with('"')) {
        return false;
    }
    // Comments between the literals of a run are replaced with it.
    let (Some(&from), Some(&to)) = (view.code.get(first), view.code.get(last)) else {
        return false;
    };
    if view.tokens[from..=to].iter().any(|t| t.text(view.src).contains(SENTINEL_STEM)) {
        return false;
    }
    let Some(prev) = first.checked_sub(1) else { return false };
    let prev_text = view.text(prev);
    let prev_ok = ALLOWED_PREDECESSORS.contains(&prev_text)
        || (view.kind(prev) == Some(TokenKind::Identifier) && prev_text == "return");
    if !prev_ok {
        return false;
    }
    // `char buf[] = "..."` must stay an array initializer.
    if prev_text == "=" && prev.checked_sub(1).is_some_and(|p| view.is_punct(p, "]")) {
        return false;
    }
    // `"abc" MACRO "def"` concatenation.
    if matches!(
        view.kind(last + 1),
        Some(TokenKind::Identifier | TokenKind::Number | TokenKind::CharLiteral)
    ) {
        return false;
    }
    !(scope.stmt_start..first).any(|i| view.is_ident(i, "static") || view.is_ident(i, "case"))
}

/// Text after [`splice`], plus the spans it could not apply.
#[derive(Debug, Clone, Default)]
pub(crate) struct Spliced {
    pub text: String,
    /// Replacements that overlap an earlier one or fall outside the text.
    pub rejected: Vec<Span>,
}

/// Apply replacements sorted by start offset. A replacement that overlaps an
/// earlier one or does not fit the text is left out and reported.
pub(crate) fn splice(text: &str, replacements: &[(Span, String)]) -> Spliced {
    let mut out = String::with_capacity(text.len());
    let mut rejected = Vec::new();
    let mut cursor = 0;
    for (span, replacement) in replacements {
        if span.start < cursor || span.end > text.len() || text.get(span.range()).is_none() {
            rejected.push(*span);
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        out.push_str(replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    Spliced { text: out, rejected }
}
