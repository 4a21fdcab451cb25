use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use veil_core::{ObfuscationReport, Pipeline, SourceUnit};

use crate::commands::strategy_label;
use crate::{default_output_path, resolve_config, sha256_file, ConfigOverrides};

#[derive(Serialize)]
pub struct ObfuscateSummary {
    pub input: String,
    pub output: String,
    pub output_sha256: String,
    pub report: ObfuscationReport,
}

/// Obfuscate one input file and write the result.
pub fn obfuscate_command(
    input: &Path,
    output: Option<&Path>,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    json: bool,
) -> Result<()> {
    let config = resolve_config(config_path, overrides)?;
    let bytes =
        fs::read(input).with_context(|| format!("Failed to read input file: {}", input.display()))?;
    let unit = SourceUnit::from_bytes(&bytes).with_path(input);

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let result = pipeline
        .run(&unit)
        .with_context(|| format!("Failed to obfuscate {}", input.display()))?;

    let out_path: PathBuf = output.map(Path::to_path_buf).unwrap_or_else(|| default_output_path(input));
    fs::write(&out_path, &result.bytes)
        .with_context(|| format!("Failed to write output file: {}", out_path.display()))?;
    tracing::debug!(output = %out_path.display(), bytes = result.bytes.len(), "wrote obfuscated unit");

    let summary = ObfuscateSummary {
        input: input.display().to_string(),
        output: out_path.display().to_string(),
        output_sha256: sha256_file(&out_path)?,
        report: result.report,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ObfuscateSummary) {
    let report = &summary.report;
    println!("Obfuscated source:");
    println!("  Input: {}", summary.input);
    println!("  Output: {}", summary.output);
    match &report.fallback_reason {
        Some(reason) => println!("  Strategy: {} (fallback: {reason})", strategy_label(report.strategy)),
        None => println!("  Strategy: {}", strategy_label(report.strategy)),
    }
    println!("  Renamed identifiers: {}", report.renames.len());
    match &report.decoder_name {
        Some(decoder) => println!("  Encrypted strings: {} (decoder {decoder})", report.literals.len()),
        None => println!("  Encrypted strings: {}", report.literals.len()),
    }
    println!("  Numeric rewrites: {}", report.numeric_rewrites);
    println!("  Dead functions: {}", report.dead_functions.len());
    println!("  Opaque predicates: {}", report.opaque_predicates);
    println!("  Comments replaced: {}", report.comments_replaced);
    println!("  Seed: {}", report.seed);
    println!("  Output SHA-256: {}", summary.output_sha256);

    if !report.skipped.is_empty() {
        println!();
        println!("Skipped:");
        for item in &report.skipped {
            println!("- [{}] {} {}", item.stage, item.span, item.reason);
        }
    }
}
