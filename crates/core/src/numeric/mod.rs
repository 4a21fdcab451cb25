//! Integer-constant rewriting.
//!
//! Each eligible integer literal becomes an arithmetic expression over
//! literals of the same type that evaluates to the original value. The
//! expression is built as a `ConstExpr` tree first, checked by evaluation, and
//! only then rendered into the text.

use rand::rngs::StdRng;
use rand::Rng;

use crate::pipeline::{SkippedItem, Stage};
use crate::source::Span;
use crate::token::{directive_names, tokenize, CodeView, Token, TokenKind};

/// Literals with a value at or below this are left alone.
pub const MIN_SPLIT_VALUE: u64 = 8;
/// Largest value rewritten; every generated operand then fits `int`.
pub const MAX_SPLIT_VALUE: u64 = i32::MAX as u64;

/// Arithmetic expression over integer literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstExpr {
    Lit(i64),
    Xor(Box<ConstExpr>, Box<ConstExpr>),
    Shl(Box<ConstExpr>, u32),
    Add(Box<ConstExpr>, Box<ConstExpr>),
}

impl ConstExpr {
    /// Value of the expression, or `None` on overflow.
    pub fn eval(&self) -> Option<i64> {
        match self {
            ConstExpr::Lit(v) => Some(*v),
            ConstExpr::Xor(a, b) => Some(a.eval()? ^ b.eval()?),
            ConstExpr::Shl(a, s) => a.eval()?.checked_mul(1i64.checked_shl(*s)?),
            ConstExpr::Add(a, b) => a.eval()?.checked_add(b.eval()?),
        }
    }

    pub fn render(&self, style: &LiteralStyle) -> String {
        match self {
            ConstExpr::Lit(v) => style.literal(*v),
            ConstExpr::Xor(a, b) => format!("({} ^ {})", a.render(style), b.render(style)),
            ConstExpr::Shl(a, s) => format!("({} << {s})", a.render(style)),
            ConstExpr::Add(a, b) => format!("({} + {})", a.render(style), b.render(style)),
        }
    }
}

/// The three rewrite forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitForm {
    DoubleXor,
    Shift,
    Additive,
}

/// `((v ^ k) ^ k)` with `k` in `[1, 255]`.
pub fn xor_form(v: i64, rng: &mut StdRng) -> ConstExpr {
    let k: i64 = rng.gen_range(1..=255);
    ConstExpr::Xor(Box::new(ConstExpr::Lit(v ^ k)), Box::new(ConstExpr::Lit(k)))
}

/// `((hi << s) + lo)`; only defined for non-negative values.
pub fn shift_form(v: i64, rng: &mut StdRng) -> Option<ConstExpr> {
    if v < 0 {
        return None;
    }
    let bitlen = (64 - v.leading_zeros()).max(1);
    let s = rng.gen_range(1..=bitlen.min(6));
    let hi = v >> s;
    let lo = v & ((1i64 << s) - 1);
    Some(ConstExpr::Add(
        Box::new(ConstExpr::Shl(Box::new(ConstExpr::Lit(hi)), s)),
        Box::new(ConstExpr::Lit(lo)),
    ))
}

/// `(a + b)` with `a` of the same sign as `v` and `|a|` in `[1, max(1, |v|/2)]`.
pub fn additive_form(v: i64, rng: &mut StdRng) -> Option<ConstExpr> {
    let bound = (v.unsigned_abs() / 2).max(1);
    let magnitude = rng.gen_range(1..=bound) as i64;
    let a = if v < 0 { -magnitude } else { magnitude };
    let b = v.checked_sub(a)?;
    Some(ConstExpr::Add(Box::new(ConstExpr::Lit(a)), Box::new(ConstExpr::Lit(b))))
}

pub fn generate(form: SplitForm, v: i64, rng: &mut StdRng) -> Option<ConstExpr> {
    match form {
        SplitForm::DoubleXor => Some(xor_form(v, rng)),
        SplitForm::Shift => shift_form(v, rng),
        SplitForm::Additive => additive_form(v, rng),
    }
}

/// Radix and suffix every operand inherits from the rewritten literal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiteralStyle {
    pub hex: bool,
    pub suffix: String,
}

impl LiteralStyle {
    fn literal(&self, v: i64) -> String {
        let magnitude = v.unsigned_abs();
        let body = if self.hex {
            format!("0x{magnitude:x}{}", self.suffix)
        } else {
            format!("{magnitude}{}", self.suffix)
        };
        if v < 0 {
            format!("(-{body})")
        } else {
            body
        }
    }
}

/// An integer literal split into value and style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntLiteral {
    pub value: u64,
    pub style: LiteralStyle,
}

/// Parse a C integer literal; `None` for floats and malformed numbers.
pub fn parse_int_literal(raw: &str) -> Option<IntLiteral> {
    let cleaned: String = raw.chars().filter(|c| *c != '\'').collect();
    let lower = cleaned.to_ascii_lowercase();
    let (radix, digits_start, hex) = if lower.starts_with("0x") {
        (16, 2, true)
    } else if lower.starts_with("0b") {
        (2, 2, false)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, 1, false)
    } else {
        (10, 0, false)
    };
    let rest = &cleaned[digits_start..];
    let digits_len = rest.chars().take_while(|c| c.is_digit(radix)).count();
    let (digits, suffix) = rest.split_at(digits_len);
    if digits.is_empty() && radix != 8 {
        return None;
    }
    if !is_integer_suffix(suffix) {
        return None;
    }
    let value = if digits.is_empty() { 0 } else { u64::from_str_radix(digits, radix).ok()? };
    Some(IntLiteral { value, style: LiteralStyle { hex, suffix: suffix.to_string() } })
}

fn is_integer_suffix(suffix: &str) -> bool {
    matches!(
        suffix.to_ascii_lowercase().as_str(),
        "" | "u" | "l" | "ul" | "lu" | "ll" | "ull" | "llu" | "z" | "uz" | "zu"
    ) && !suffix.contains("lL")
        && !suffix.contains("Ll")
}

#[derive(Debug, Clone, Default)]
pub struct NumericOutcome {
    pub text: String,
    pub rewrites: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Rewrite eligible integer literals of `text`, each with `probability`.
pub fn split_constants(text: &str, probability: f64, rng: &mut StdRng) -> NumericOutcome {
    let tokens = tokenize(text);
    let eligible_positions = rewritable_numbers(text, &tokens);
    let probability = probability.clamp(0.0, 1.0);
    let mut outcome = NumericOutcome::default();
    let mut replacements: Vec<(Span, String)> = Vec::new();

    for index in eligible_positions {
        let token = &tokens[index];
        let Some(literal) = parse_int_literal(token.text(text)) else { continue };
        if literal.value <= MIN_SPLIT_VALUE || literal.value > MAX_SPLIT_VALUE {
            continue;
        }
        if !rng.gen_bool(probability) {
            continue;
        }
        let forms = [SplitForm::DoubleXor, SplitForm::Shift, SplitForm::Additive];
        let form = forms[rng.gen_range(0..forms.len())];
        let value = literal.value as i64;
        match generate(form, value, rng).filter(|e| e.eval() == Some(value)) {
            Some(expr) => {
                replacements.push((token.span, expr.render(&literal.style)));
                outcome.rewrites += 1;
            }
            None => outcome.skipped.push(SkippedItem::new(
                Stage::Numeric,
                token.span,
                format!("{form:?} rewrite did not reproduce {value}"),
            )),
        }
    }

    let spliced = crate::literal::splice(text, &replacements);
    outcome.text = spliced.text;
    outcome.rewrites -= spliced.rejected.len();
    for span in spliced.rejected {
        outcome.skipped.push(SkippedItem::new(Stage::Numeric, span, "overlapping replacement"));
    }
    tracing::debug!(rewrites = outcome.rewrites, "split numeric constants");
    outcome
}

/// Token indices of number tokens outside compile-time-only parentheses.
/// On directive lines only `#define` bodies and `#if`/`#elif` conditions count.
fn rewritable_numbers(text: &str, tokens: &[Token]) -> Vec<usize> {
    let view = CodeView::new(text, tokens);
    let names = directive_names(text, tokens);
    let mut out = Vec::new();
    for (index, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Number {
            continue;
        }
        if token.directive {
            let operand_of_paste =
                names[index] == Some("define") && next_to_paste(text, tokens, index);
            if matches!(names[index], Some("define" | "if" | "elif")) && !operand_of_paste {
                out.push(index);
            }
            continue;
        }
        let restricted = view
            .code_index_of(index)
            .and_then(|ci| view.scope(ci))
            .is_some_and(|s| s.restricted);
        if !restricted {
            out.push(index);
        }
    }
    out
}

/// The nearest code tokens of the directive line around `index` include a
/// `#` or `##` operator.
fn next_to_paste(text: &str, tokens: &[Token], index: usize) -> bool {
    let is_operator =
        |t: &Token| !t.opens_directive && (t.is_punct(text, "#") || t.is_punct(text, "##"));
    let before = tokens[..index].iter().rev().take_while(|t| t.directive).find(|t| t.is_code());
    let after = tokens[index + 1..].iter().take_while(|t| t.directive).find(|t| t.is_code());
    before.is_some_and(is_operator) || after.is_some_and(is_operator)
}
