use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use veil_core::{Pipeline, SourceUnit};

use crate::commands::strategy_label;
use crate::{resolve_config, ConfigOverrides};

/// Run fact extraction only and print the rename candidates.
pub fn inspect_command(
    input: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    json: bool,
) -> Result<()> {
    let config = resolve_config(config_path, overrides)?;
    let bytes =
        fs::read(input).with_context(|| format!("Failed to read input file: {}", input.display()))?;
    let unit = SourceUnit::from_bytes(&bytes).with_path(input);

    let extraction = Pipeline::new(config)
        .context("Invalid configuration")?
        .inspect(&unit)
        .with_context(|| format!("Failed to extract facts from {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
        return Ok(());
    }

    println!("Strategy: {}", strategy_label(extraction.strategy));
    if let Some(reason) = &extraction.fallback_reason {
        println!("Fallback reason: {reason}");
    }
    println!("Candidates:");
    if extraction.candidates.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for candidate in &extraction.candidates {
        let roles: Vec<String> = candidate
            .roles
            .iter()
            .map(|r| serde_json::to_value(r).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default())
            .collect();
        println!("- {} [{}] x{}", candidate.name, roles.join(", "), candidate.occurrences);
    }
    Ok(())
}
