use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::extract::StrategyKind;
use crate::source::Span;

/// Pipeline stage that produced a report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Comments,
    Numeric,
    Literals,
    Inject,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Comments => "comments",
            Stage::Numeric => "numeric",
            Stage::Literals => "literals",
            Stage::Inject => "inject",
        };
        f.write_str(name)
    }
}

/// An item a stage left untransformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub stage: Stage,
    /// Span in the text as the stage saw it.
    pub span: Span,
    pub reason: String,
}

impl SkippedItem {
    pub fn new(stage: Stage, span: Span, reason: impl Into<String>) -> Self {
        let item = Self { stage, span, reason: reason.into() };
        tracing::warn!(stage = %item.stage, span = %item.span, reason = %item.reason, "skipped item");
        item
    }
}

/// Per-literal summary; the bytes themselves stay out of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralSummary {
    pub key: u8,
    pub length: usize,
    pub lossy: bool,
}

/// Everything one pipeline invocation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationReport {
    pub strategy: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub renames: BTreeMap<String, String>,
    pub literals: Vec<LiteralSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder_name: Option<String>,
    pub numeric_rewrites: usize,
    pub dead_functions: Vec<String>,
    pub opaque_predicates: usize,
    pub comments_replaced: usize,
    pub skipped: Vec<SkippedItem>,
    pub source_sha256: String,
    pub seed: u64,
    pub started_at: String,
    pub finished_at: String,
}

impl ObfuscationReport {
    pub fn new(strategy: StrategyKind, source: &[u8], seed: u64, started_at: String) -> Self {
        Self {
            strategy,
            fallback_reason: None,
            renames: BTreeMap::new(),
            literals: Vec::new(),
            decoder_name: None,
            numeric_rewrites: 0,
            dead_functions: Vec::new(),
            opaque_predicates: 0,
            comments_replaced: 0,
            skipped: Vec::new(),
            source_sha256: sha256_hex(source),
            seed,
            finished_at: started_at.clone(),
            started_at,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_lowercase_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn report_serializes_with_snake_case_enums() {
        let mut report = ObfuscationReport::new(StrategyKind::TokenBased, b"int x;", 9, "t0".into());
        report.skipped.push(SkippedItem::new(Stage::Literals, Span::new(1, 4), "embedded NUL"));
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["strategy"], "token_based");
        assert_eq!(json["skipped"][0]["stage"], "literals");
        assert!(json.get("decoder_name").is_none());
    }
}
