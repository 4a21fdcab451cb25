use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use veil_core::{ObfuscationConfig, Scheme};

pub mod commands;

/// `<stem>_obf.<ext>` next to the input; `<stem>_obf` when there is no extension.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    let name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_obf.{ext}"),
        None => format!("{stem}_obf"),
    };
    input.with_file_name(name)
}

/// Split a `;`-separated compiler argument list, dropping empty parts.
pub fn split_clang_args(raw: &str) -> Vec<String> {
    raw.split(';').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect()
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Command-line adjustments applied on top of a scheme or config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub scheme: Option<Scheme>,
    pub seed: Option<u64>,
    pub no_rename: bool,
    pub no_strings: bool,
    pub no_const: bool,
    pub no_opaque: bool,
    pub no_strip_comments: bool,
    pub garbage_count: Option<usize>,
    pub coverage: Option<f64>,
    pub clang: Option<PathBuf>,
    /// Raw `;`-separated list.
    pub clang_args: Option<String>,
}

/// Start from the config file (or the scheme, `diff` by default) and apply
/// the command-line overrides. The result is validated.
pub fn resolve_config(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<ObfuscationConfig> {
    let mut config = match config_path {
        Some(path) => ObfuscationConfig::load(path)?,
        None => overrides.scheme.unwrap_or(Scheme::Diff).config(),
    };

    if overrides.seed.is_some() {
        config.seed = overrides.seed;
    }
    if overrides.no_rename {
        config.enable_rename = false;
    }
    if overrides.no_strings {
        config.enable_string_encryption = false;
    }
    if overrides.no_const {
        config.enable_numeric_splitting = false;
    }
    if overrides.no_strip_comments {
        config.enable_comment_stripping = false;
    }
    if let Some(count) = overrides.garbage_count {
        config.dead_code_count = count;
        config.enable_dead_code_injection = count > 0;
    }
    if overrides.no_opaque {
        config.opaque_predicate_count = Some(0);
    }
    if let Some(ratio) = overrides.coverage {
        config.rename_coverage_ratio = ratio;
    }
    if let Some(clang) = &overrides.clang {
        config.structural.clang_path = Some(clang.clone());
    }
    if let Some(raw) = &overrides.clang_args {
        config.structural.clang_args = split_clang_args(raw);
    }

    config.validate()?;
    Ok(config)
}
