#![cfg(feature = "clang-parser")]

use std::path::PathBuf;

use veil_core::extract::{StrategyKind, SymbolRole};
use veil_core::{ObfuscationConfig, Pipeline, Scheme, SourceUnit};

const SOURCE: &str = "#include <stdio.h>\n\nint hits;\nvoid bump(int step) { hits += step; }\nint main(void) { bump(1); puts(\"x\"); return hits; }\n";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

#[test]
fn structural_extraction_uses_the_declaration_tree() {
    // Canned AST so the test does not need clang installed.
    std::env::set_var("VEIL_CLANG_FAKE_JSON", fixture("counter_ast.json"));

    let config = ObfuscationConfig { seed: Some(6), ..Scheme::Easy.config() };
    let pipeline = Pipeline::new(config).expect("valid config");
    let unit = SourceUnit::from_text(SOURCE);

    let extraction = pipeline.inspect(&unit).expect("inspect");
    assert_eq!(extraction.strategy, StrategyKind::Structural);
    assert!(extraction.fallback_reason.is_none());
    let names: Vec<&str> = extraction.candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["bump", "hits", "step"]);
    let hits = extraction.candidate("hits").expect("hits");
    assert!(hits.has_role(SymbolRole::Variable));
    assert_eq!(hits.occurrences, 3);

    let out = pipeline.run(&unit).expect("run");
    assert_eq!(out.report.strategy, StrategyKind::Structural);
    assert_eq!(out.report.renames.len(), 3);
    assert!(out.text.contains("int main(void)"));
    assert!(out.text.contains("puts("));
}
