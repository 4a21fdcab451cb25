//! Protected-marker guard.
//!
//! Every occurrence of `<open> ... <close>` (shortest match, may span lines)
//! is swapped for an identifier-shaped sentinel before any transform runs and
//! restored afterwards. Sentinels are valid C identifiers, so they survive the
//! tokenizer as a single token wherever the marker appeared: code, comment or
//! literal.

use rand::rngs::StdRng;
use rand::Rng;
use regex::{Captures, Regex};
use thiserror::Error;

pub const DEFAULT_MARKER_OPEN: &str = "<<$";
pub const DEFAULT_MARKER_CLOSE: &str = "$>>";

/// Every sentinel starts with this; rename and extraction refuse such names.
pub const SENTINEL_STEM: &str = "__veil_guard_";

const MAX_NONCE_ATTEMPTS: usize = 64;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("marker delimiters must be non-empty")]
    EmptyDelimiter,
    #[error("invalid marker pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("could not find a sentinel prefix absent from the input")]
    NonceExhausted,
}

/// Marker delimiters and the compiled bracketing pattern.
#[derive(Debug, Clone)]
pub struct MarkerGuard {
    pattern: Regex,
}

impl MarkerGuard {
    pub fn new(open: &str, close: &str) -> Result<Self, GuardError> {
        if open.is_empty() || close.is_empty() {
            return Err(GuardError::EmptyDelimiter);
        }
        let pattern =
            Regex::new(&format!("{}(?s:.*?){}", regex::escape(open), regex::escape(close)))?;
        Ok(Self { pattern })
    }

    /// Replace every marker occurrence with a fresh sentinel.
    pub fn guard(&self, text: &str, rng: &mut StdRng) -> Result<(String, Guard), GuardError> {
        let prefix = fresh_prefix(text, rng)?;
        let mut originals = Vec::new();
        let guarded = self.pattern.replace_all(text, |caps: &Captures<'_>| {
            let idx = originals.len();
            originals.push(caps[0].to_string());
            format!("{prefix}{idx}__")
        });
        tracing::debug!(markers = originals.len(), "guarded protected markers");
        let sentinel = Regex::new(&format!("{}([0-9]+)__", regex::escape(&prefix)))?;
        Ok((guarded.into_owned(), Guard { prefix, originals, sentinel }))
    }
}

/// Record of the markers replaced by one `MarkerGuard::guard` call.
#[derive(Debug, Clone)]
pub struct Guard {
    prefix: String,
    originals: Vec<String>,
    sentinel: Regex,
}

impl Guard {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn marker_count(&self) -> usize {
        self.originals.len()
    }

    /// Whether `text` contains any sentinel of this guard.
    pub fn contains_sentinel(&self, text: &str) -> bool {
        !self.originals.is_empty() && text.contains(&self.prefix)
    }

    /// Restore every sentinel to the marker text it replaced.
    pub fn unguard(&self, text: &str) -> String {
        if self.originals.is_empty() {
            return text.to_string();
        }
        self.sentinel
            .replace_all(text, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| self.originals.get(idx))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn fresh_prefix(text: &str, rng: &mut StdRng) -> Result<String, GuardError> {
    for _ in 0..MAX_NONCE_ATTEMPTS {
        let nonce: u32 = rng.gen();
        let prefix = format!("{SENTINEL_STEM}{nonce:08x}_");
        if !text.contains(&prefix) {
            return Ok(prefix);
        }
    }
    Err(GuardError::NonceExhausted)
}
