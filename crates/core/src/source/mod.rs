//! Source units and spans.
//!
//! A `SourceUnit` owns the decoded text of exactly one input file for the
//! duration of a pipeline invocation. Every other stage refers back into it
//! through `Span`s, which are plain half-open byte ranges.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Encoding detected when the unit was decoded from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEncoding {
    /// Plain UTF-8.
    Utf8,
    /// UTF-8 preceded by a byte-order mark. The mark is stripped from the text
    /// and re-emitted by `SourceUnit::encode_output`.
    Utf8WithBom,
    /// Input was not valid UTF-8; invalid sequences were replaced.
    Lossy,
}

/// Immutable text of one input plus its detected encoding.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    text: String,
    encoding: SourceEncoding,
    path: Option<PathBuf>,
}

impl SourceUnit {
    /// Build a unit from text that is already decoded.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), encoding: SourceEncoding::Utf8, path: None }
    }

    /// Decode raw bytes, detecting a UTF-8 BOM and degrading to a lossy decode
    /// when the bytes are not valid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let (body, bom) = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) => (rest, true),
            None => (bytes, false),
        };
        match std::str::from_utf8(body) {
            Ok(text) => Self {
                text: text.to_string(),
                encoding: if bom { SourceEncoding::Utf8WithBom } else { SourceEncoding::Utf8 },
                path: None,
            },
            Err(_) => Self {
                text: String::from_utf8_lossy(body).into_owned(),
                encoding: SourceEncoding::Lossy,
                path: None,
            },
        }
    }

    /// Builder-style helper to remember where the unit was read from.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Encode transformed text the way the input was encoded (BOM preserved).
    pub fn encode_output(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() + UTF8_BOM.len());
        if self.encoding == SourceEncoding::Utf8WithBom {
            out.extend_from_slice(UTF8_BOM);
        }
        out.extend_from_slice(text.as_bytes());
        out
    }
}

/// Half-open byte range `[start, end)` into a unit's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Text under this span, or `None` if the span does not lie on character
    /// boundaries inside `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.start > self.end {
            return None;
        }
        text.get(self.range())
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
