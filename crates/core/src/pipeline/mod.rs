//! One obfuscation invocation, stage by stage.
//!
//! Stages run in a fixed order over the guarded text: comments, rename,
//! numeric constants, string literals, dead code and opaque predicates. Facts
//! are extracted once, before any stage edits the text, and every stage
//! re-tokenizes what it is given. A single `StdRng` seeded per invocation
//! feeds every random choice, so a fixed seed reproduces the output exactly.

mod config;
mod report;

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::assemble;
use crate::comments;
use crate::extract::{
    DeclarationParser, ExtractError, Extraction, FactExtractor, NameFilter, ParseOptions, Strategy,
    StructuralStrategy, DECODER_PREFIX, RENAME_PREFIX,
};
use crate::guard::{GuardError, MarkerGuard};
use crate::inject;
use crate::literal;
use crate::numeric;
use crate::rename::{self, NameRegistry, RenameError};
use crate::source::SourceUnit;

pub use config::{InvalidConfig, ObfuscationConfig, Scheme, StructuralConfig};
pub use report::{sha256_hex, LiteralSummary, ObfuscationReport, SkippedItem, Stage};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Rename(#[from] RenameError),
}

/// Transformed unit plus what was done to it.
#[derive(Debug, Clone)]
pub struct ObfuscationOutput {
    pub text: String,
    /// `text` encoded like the input (BOM re-emitted).
    pub bytes: Vec<u8>,
    pub report: ObfuscationReport,
}

/// A validated configuration and, optionally, a declaration parser.
#[derive(Clone)]
pub struct Pipeline {
    config: ObfuscationConfig,
    parser: Option<Arc<dyn DeclarationParser>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("parser", &self.parser.as_ref().map(|p| p.name()))
            .finish()
    }
}

impl Pipeline {
    /// Validate `config`. With `structural.enabled` the clang parser is used
    /// unless another one is supplied through `with_parser`.
    pub fn new(config: ObfuscationConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, parser: None })
    }

    pub fn with_parser<P: DeclarationParser + 'static>(mut self, parser: P) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn config(&self) -> &ObfuscationConfig {
        &self.config
    }

    fn strategy(&self, unit: &SourceUnit) -> Strategy {
        if !self.config.structural.enabled {
            return Strategy::default();
        }
        let options = ParseOptions {
            path: unit.path().map(|p| p.to_path_buf()),
            args: self.config.structural.clang_args.clone(),
        };
        match self.default_parser() {
            Some(parser) => Strategy::Structural(StructuralStrategy { parser, options }),
            None => Strategy::default(),
        }
    }

    #[cfg(feature = "clang-parser")]
    fn default_parser(&self) -> Option<Arc<dyn DeclarationParser>> {
        use crate::extract::structural::ClangAstParser;
        let clang = || -> Arc<dyn DeclarationParser> {
            Arc::new(ClangAstParser::new(self.config.structural.clang_path.clone()))
        };
        Some(self.parser.clone().unwrap_or_else(clang))
    }

    #[cfg(not(feature = "clang-parser"))]
    fn default_parser(&self) -> Option<Arc<dyn DeclarationParser>> {
        self.parser.clone()
    }

    fn extractor(&self, unit: &SourceUnit) -> FactExtractor {
        let filter = NameFilter::new(self.config.preserve_names.iter().cloned());
        FactExtractor::new(self.strategy(unit), filter)
    }

    /// Fact extraction only, over the guarded text.
    pub fn inspect(&self, unit: &SourceUnit) -> Result<Extraction, PipelineError> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.unwrap_or(0));
        let marker_guard = MarkerGuard::new(&self.config.marker_open, &self.config.marker_close)?;
        let (guarded, _) = marker_guard.guard(unit.text(), &mut rng)?;
        Ok(self.extractor(unit).extract(&guarded)?)
    }

    /// Run every enabled stage over `unit`.
    pub fn run(&self, unit: &SourceUnit) -> Result<ObfuscationOutput, PipelineError> {
        let config = &self.config;
        let started_at = Utc::now().to_rfc3339();
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let _span = tracing::debug_span!("pipeline", seed, path = ?unit.path()).entered();

        let marker_guard = MarkerGuard::new(&config.marker_open, &config.marker_close)?;
        let (mut text, guard) = marker_guard.guard(unit.text(), &mut rng)?;

        let extraction = self.extractor(unit).extract(&text)?;
        let mut report = ObfuscationReport::new(
            extraction.strategy,
            &unit.encode_output(unit.text()),
            seed,
            started_at,
        );
        report.fallback_reason = extraction.fallback_reason.clone();
        let mut registry = NameRegistry::new(&extraction.identifiers);

        if config.enable_comment_stripping {
            let out = comments::sanitize(&text, &mut rng);
            report.comments_replaced = out.replaced;
            report.skipped.extend(out.skipped);
            text = out.text;
        }

        if config.enable_rename {
            let mapping = rename::build_mapping(
                &extraction.candidates,
                &mut registry,
                RENAME_PREFIX,
                config.rename_coverage_ratio,
                &mut rng,
            )?;
            text = rename::apply(&text, &mapping);
            report.renames = mapping.pairs().clone();
        }

        if config.enable_numeric_splitting {
            let out = numeric::split_constants(&text, config.numeric_probability, &mut rng);
            report.numeric_rewrites = out.rewrites;
            report.skipped.extend(out.skipped);
            text = out.text;
        }

        let mut decoder = None;
        if config.enable_string_encryption {
            let name = registry.fresh(DECODER_PREFIX, &mut rng)?;
            let out = literal::encrypt_literals(&text, &name, &mut rng);
            report.literals = out
                .entries
                .iter()
                .map(|e| LiteralSummary { key: e.key, length: e.original_bytes.len(), lossy: e.lossy })
                .collect();
            report.skipped.extend(out.skipped);
            if !out.entries.is_empty() {
                report.decoder_name = Some(name.clone());
                decoder = Some(name);
            }
            text = out.text;
        }

        let mut dead = Vec::new();
        if config.enable_dead_code_injection && config.dead_code_count > 0 {
            dead = inject::inject_dead_functions(config.dead_code_count, &mut registry, &mut rng)?;
            let out = inject::insert_opaque_predicates(&text, &dead, config.predicate_count(), &mut rng);
            report.opaque_predicates = out.predicates.len();
            report.skipped.extend(out.skipped);
            report.dead_functions = dead.iter().map(|d| d.name.clone()).collect();
            text = out.text;
        }

        let block = assemble::helper_block(decoder.as_deref(), &dead);
        let text = guard.unguard(&assemble::assemble(&text, &block));

        report.finished_at = Utc::now().to_rfc3339();
        tracing::debug!(
            renames = report.renames.len(),
            literals = report.literals.len(),
            numeric = report.numeric_rewrites,
            predicates = report.opaque_predicates,
            skipped = report.skipped.len(),
            "pipeline finished"
        );
        Ok(ObfuscationOutput { bytes: unit.encode_output(&text), text, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DeclarationTree, ParseError, StrategyKind};

    struct Unavailable;

    impl DeclarationParser for Unavailable {
        fn parse(&self, _: &str, _: &ParseOptions) -> Result<DeclarationTree, ParseError> {
            Err(ParseError::Unavailable("no parser in tests".into()))
        }

        fn name(&self) -> &'static str {
            "unavailable"
        }
    }

    fn pipeline(config: ObfuscationConfig) -> Pipeline {
        Pipeline::new(config).expect("valid config").with_parser(Unavailable)
    }

    #[test]
    fn rejects_invalid_config_before_running() {
        let config = ObfuscationConfig { numeric_probability: 3.0, ..Default::default() };
        assert!(matches!(Pipeline::new(config), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn structural_failure_is_reported_as_fallback() {
        let config = ObfuscationConfig { seed: Some(1), ..Scheme::Easy.config() };
        let out = pipeline(config).run(&SourceUnit::from_text("int total;\n")).expect("run");
        assert_eq!(out.report.strategy, StrategyKind::TokenBased);
        assert!(out.report.fallback_reason.as_deref().is_some_and(|r| r.contains("no parser")));
        assert!(out.report.renames.contains_key("total"));
    }

    #[test]
    fn disabled_stages_leave_text_alone() {
        let config = ObfuscationConfig {
            enable_rename: false,
            enable_string_encryption: false,
            enable_numeric_splitting: false,
            enable_dead_code_injection: false,
            enable_comment_stripping: false,
            seed: Some(3),
            ..Default::default()
        };
        let src = "/* c */\nint main(void) { return 42; }\n";
        let out = pipeline(config).run(&SourceUnit::from_text(src)).expect("run");
        assert_eq!(out.text, src);
        assert!(out.report.decoder_name.is_none());
    }

    #[test]
    fn bom_is_preserved() {
        let config = ObfuscationConfig { seed: Some(5), ..Scheme::Easy.config() };
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"int x;\n");
        let out = pipeline(config).run(&SourceUnit::from_bytes(&bytes)).expect("run");
        assert!(out.bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        assert!(!out.text.starts_with('\u{feff}'));
    }
}
