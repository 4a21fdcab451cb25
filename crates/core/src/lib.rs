//! veil-core
//!
//! Core library for semantics-preserving obfuscation of C source units.
//!
//! A `pipeline::Pipeline` guards protected markers, extracts rename candidates
//! (from a clang declaration tree, or from token patterns when no parser is
//! available), then renames identifiers, splits numeric constants, encrypts
//! string literals behind a synthesized decoder, injects dead functions with
//! opaque predicates and scrubs comments.
//!
//! All transformation logic lives here so it is fully testable and reusable
//! from any frontend; the `veil` CLI is a thin wrapper.

pub mod source;
pub mod lexicon;
pub mod token;
pub mod guard;
pub mod extract;
pub mod rename;
pub mod comments;
pub mod numeric;
pub mod literal;
pub mod inject;
pub mod assemble;
pub mod pipeline;

pub use pipeline::{ObfuscationConfig, ObfuscationOutput, ObfuscationReport, Pipeline, PipelineError, Scheme};
pub use source::SourceUnit;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
