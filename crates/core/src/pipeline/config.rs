use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::{DEFAULT_MARKER_CLOSE, DEFAULT_MARKER_OPEN};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfig(pub String);

/// Structural (clang AST) extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralConfig {
    pub enabled: bool,
    /// Explicit clang binary; otherwise `VEIL_CLANG_BIN`, then `clang` on PATH.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clang_path: Option<PathBuf>,
    /// Extra compiler arguments (`-I`, `-D`, ...).
    pub clang_args: Vec<String>,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self { enabled: true, clang_path: None, clang_args: Vec::new() }
    }
}

/// Serializable configuration of one pipeline invocation.
///
/// Missing fields take the defaults of the `diff` scheme, so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationConfig {
    pub enable_rename: bool,
    /// Share of rename candidates that are actually renamed, in `[0, 1]`.
    pub rename_coverage_ratio: f64,
    pub enable_string_encryption: bool,
    pub enable_numeric_splitting: bool,
    /// Per-literal rewrite probability, in `[0, 1]`.
    pub numeric_probability: f64,
    pub enable_dead_code_injection: bool,
    pub dead_code_count: usize,
    /// Defaults to twice `dead_code_count`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opaque_predicate_count: Option<usize>,
    pub enable_comment_stripping: bool,
    /// Fixed seed; drawn from entropy when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub marker_open: String,
    pub marker_close: String,
    /// Names never renamed, in addition to the built-in denylist.
    pub preserve_names: Vec<String>,
    pub structural: StructuralConfig,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Scheme::Diff.config()
    }
}

impl ObfuscationConfig {
    pub fn predicate_count(&self) -> usize {
        self.opaque_predicate_count.unwrap_or(self.dead_code_count * 2)
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(0.0..=1.0).contains(&self.rename_coverage_ratio) {
            return Err(InvalidConfig(format!(
                "rename_coverage_ratio must be within [0, 1], got {}",
                self.rename_coverage_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.numeric_probability) {
            return Err(InvalidConfig(format!(
                "numeric_probability must be within [0, 1], got {}",
                self.numeric_probability
            )));
        }
        if self.marker_open.is_empty() || self.marker_close.is_empty() {
            return Err(InvalidConfig("marker delimiters must not be empty".to_string()));
        }
        if let Some(name) = self.preserve_names.iter().find(|n| !is_identifier(n)) {
            return Err(InvalidConfig(format!("preserve_names entry `{name}` is not an identifier")));
        }
        Ok(())
    }

    /// Load a JSON or YAML config file; the extension picks the format and
    /// anything other than `.json` is read as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let is_json = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&raw).context("Failed to parse config JSON")?
        } else {
            serde_yaml::from_str(&raw).context("Failed to parse config YAML")?
        };
        config.validate()?;
        Ok(config)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Named presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// Renaming, numeric splitting and comment stripping.
    Easy,
    /// Every transform.
    Diff,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::Easy, Scheme::Diff];

    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Easy => "easy",
            Scheme::Diff => "diff",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scheme::Easy => "rename identifiers, split numeric constants (p=0.6), strip comments",
            Scheme::Diff => "every transform: rename, string encryption, numeric splitting (p=0.7), two dead functions with opaque predicates, comment stripping",
        }
    }

    pub fn config(&self) -> ObfuscationConfig {
        let base = ObfuscationConfig {
            enable_rename: true,
            rename_coverage_ratio: 1.0,
            enable_string_encryption: true,
            enable_numeric_splitting: true,
            numeric_probability: 0.7,
            enable_dead_code_injection: true,
            dead_code_count: 2,
            opaque_predicate_count: None,
            enable_comment_stripping: true,
            seed: None,
            marker_open: DEFAULT_MARKER_OPEN.to_string(),
            marker_close: DEFAULT_MARKER_CLOSE.to_string(),
            preserve_names: Vec::new(),
            structural: StructuralConfig::default(),
        };
        match self {
            Scheme::Diff => base,
            Scheme::Easy => ObfuscationConfig {
                enable_string_encryption: false,
                numeric_probability: 0.6,
                enable_dead_code_injection: false,
                dead_code_count: 0,
                ..base
            },
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = InvalidConfig;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scheme::ALL
            .into_iter()
            .find(|scheme| scheme.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| InvalidConfig(format!("unknown scheme `{s}` (expected easy or diff)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes_match_their_descriptions() {
        let easy = Scheme::Easy.config();
        assert!(easy.enable_rename && easy.enable_numeric_splitting && easy.enable_comment_stripping);
        assert!(!easy.enable_string_encryption && !easy.enable_dead_code_injection);
        assert_eq!(easy.numeric_probability, 0.6);

        let diff = Scheme::Diff.config();
        assert!(diff.enable_string_encryption && diff.enable_dead_code_injection);
        assert_eq!(diff.dead_code_count, 2);
        assert_eq!(diff.predicate_count(), 4);
        assert_eq!("EASY".parse::<Scheme>(), Ok(Scheme::Easy));
        assert!("hard".parse::<Scheme>().is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = ObfuscationConfig { rename_coverage_ratio: 1.5, ..Default::default() };
        assert!(config.validate().is_err());
        config.rename_coverage_ratio = 0.5;
        config.numeric_probability = -0.1;
        assert!(config.validate().is_err());
        config.numeric_probability = 0.1;
        config.preserve_names = vec!["not an ident".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_yaml_and_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let yaml = dir.path().join("veil.yaml");
        std::fs::write(&yaml, "seed: 7\npreserve_names: [keep]\nstructural:\n  enabled: false\n").expect("write");
        let config = ObfuscationConfig::load(&yaml).expect("yaml");
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.preserve_names, vec!["keep".to_string()]);
        assert!(!config.structural.enabled);
        assert!(config.enable_string_encryption);

        let json = dir.path().join("veil.json");
        std::fs::write(&json, r#"{"numeric_probability": 2.0}"#).expect("write");
        let err = ObfuscationConfig::load(&json).unwrap_err();
        assert!(err.to_string().contains("numeric_probability"));
    }
}
