//! Dead functions and opaque predicates.
//!
//! Dead functions churn a `volatile` local and nothing else. Opaque predicates
//! are conditionals whose truth value is fixed when they are generated; the
//! branch that is never taken calls a dead function.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::extract::DEAD_PREFIX;
use crate::pipeline::{SkippedItem, Stage};
use crate::rename::{NameRegistry, RenameError};
use crate::source::Span;
use crate::token::{tokenize, CodeView};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadFunctionDescriptor {
    pub name: String,
    pub synthesized_body: String,
}

/// Synthesize `count` inert functions with fresh names.
pub fn inject_dead_functions(
    count: usize,
    registry: &mut NameRegistry,
    rng: &mut StdRng,
) -> Result<Vec<DeadFunctionDescriptor>, RenameError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let name = registry.fresh(DEAD_PREFIX, rng)?;
        let synthesized_body = dead_function_source(&name, rng);
        out.push(DeadFunctionDescriptor { name, synthesized_body });
    }
    tracing::debug!(count = out.len(), "synthesized dead functions");
    Ok(out)
}

fn dead_function_source(name: &str, rng: &mut StdRng) -> String {
    let seed: u64 = rng.gen();
    let multiplier: u64 = rng.gen::<u64>() | 1;
    let rounds: u32 = rng.gen_range(3..=12);
    let shift: u32 = rng.gen_range(1..=31);
    format!(
        "#if defined(__GNUC__) || defined(__clang__)\n\
         __attribute__((noinline, unused))\n\
         #endif\n\
         static void {name}(void)\n\
         {{\n\
         \x20   volatile unsigned long long t = 0x{seed:x}ULL;\n\
         \x20   int i;\n\
         \x20   for (i = 0; i < {rounds}; i++)\n\
         \x20       t = (t * 0x{multiplier:x}ULL) ^ (t >> {shift});\n\
         \x20   (void)t;\n\
         }}\n"
    )
}

/// `((A*B) ^ ((A << L) | (B >> R))) % M == V` over 64-bit unsigned arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateExpr {
    pub a: u64,
    pub b: u64,
    pub lshift: u32,
    pub rshift: u32,
    pub modulus: u64,
    pub compare_to: u64,
}

impl PredicateExpr {
    /// Draw operands and pick `compare_to` so the condition equals `truth`.
    pub fn generate(truth: bool, rng: &mut StdRng) -> Self {
        let a = rng.gen_range(1..=(1u64 << 30));
        let b = rng.gen_range(1..=(1u64 << 30));
        let lshift = rng.gen_range(1..=7);
        let rshift = rng.gen_range(1..=7);
        let modulus = rng.gen_range(97..=997u64) | 1;
        let mut expr = Self { a, b, lshift, rshift, modulus, compare_to: 0 };
        let value = expr.residue();
        expr.compare_to = if truth {
            value
        } else {
            (value + rng.gen_range(1..modulus)) % modulus
        };
        expr
    }

    fn residue(&self) -> u64 {
        let product = self.a.wrapping_mul(self.b);
        let mixed = self.a.wrapping_shl(self.lshift) | self.b.wrapping_shr(self.rshift);
        (product ^ mixed) % self.modulus
    }

    pub fn evaluate(&self) -> bool {
        self.residue() == self.compare_to
    }

    pub fn render(&self) -> String {
        format!(
            "((((unsigned long long){a} * (unsigned long long){b}) ^ (((unsigned long long){a} << {l}) | ((unsigned long long){b} >> {r}))) % {m} == {v})",
            a = self.a,
            b = self.b,
            l = self.lshift,
            r = self.rshift,
            m = self.modulus,
            v = self.compare_to,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaquePredicate {
    /// Offset in the text the stage saw, just past the anchoring `;`.
    pub insertion_offset: usize,
    pub condition: PredicateExpr,
    pub real_branch_is_true: bool,
    pub called_dead_function: String,
}

#[derive(Debug, Clone, Default)]
pub struct InjectOutcome {
    pub text: String,
    pub predicates: Vec<OpaquePredicate>,
    pub skipped: Vec<SkippedItem>,
}

/// Offsets just after every `;` that ends a statement directly inside a
/// function body or block and is not followed by `else` or `while`.
pub fn insertion_points(text: &str) -> Vec<usize> {
    let tokens = tokenize(text);
    let view = CodeView::new(text, &tokens);
    (0..view.len())
        .filter(|&ci| view.is_punct(ci, ";"))
        .filter(|&ci| view.scope(ci).is_some_and(|s| s.in_code_block()))
        .filter(|&ci| !view.is_ident(ci + 1, "else") && !view.is_ident(ci + 1, "while"))
        .filter_map(|ci| view.token(ci).map(|t| t.span.end))
        .collect()
}

/// Insert up to `count` opaque predicates at sampled insertion points.
pub fn insert_opaque_predicates(
    text: &str,
    dead: &[DeadFunctionDescriptor],
    count: usize,
    rng: &mut StdRng,
) -> InjectOutcome {
    let points = insertion_points(text);
    if dead.is_empty() || points.is_empty() || count == 0 {
        return InjectOutcome { text: text.to_string(), ..Default::default() };
    }
    let mut chosen: Vec<usize> = points.choose_multiple(rng, count).copied().collect();
    chosen.sort_unstable();

    let mut predicates = Vec::with_capacity(chosen.len());
    let mut insertions = Vec::with_capacity(chosen.len());
    for offset in chosen {
        let real_branch_is_true = rng.gen_bool(0.5);
        let condition = PredicateExpr::generate(real_branch_is_true, rng);
        let Some(callee) = dead.choose(rng) else { break };
        let indent = line_indent(text, offset);
        let snippet = if real_branch_is_true {
            format!("\n{indent}if ({}) {{ }} else {{ {}(); }}", condition.render(), callee.name)
        } else {
            format!("\n{indent}if ({}) {{ {}(); }} else {{ }}", condition.render(), callee.name)
        };
        insertions.push((Span::new(offset, offset), snippet));
        predicates.push(OpaquePredicate {
            insertion_offset: offset,
            condition,
            real_branch_is_true,
            called_dead_function: callee.name.clone(),
        });
    }
    let spliced = crate::literal::splice(text, &insertions);
    let mut skipped = Vec::new();
    for span in spliced.rejected {
        predicates.retain(|p| p.insertion_offset != span.start);
        skipped.push(SkippedItem::new(Stage::Inject, span, "insertion point out of range"));
    }
    tracing::debug!(inserted = predicates.len(), candidates = points.len(), "inserted opaque predicates");
    InjectOutcome { text: spliced.text, predicates, skipped }
}

/// Leading blanks of the line containing `offset`.
fn line_indent(text: &str, offset: usize) -> &str {
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &text[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}
