pub mod inspect;
pub mod obfuscate;
pub mod schemes;

pub use inspect::*;
pub use obfuscate::*;
pub use schemes::*;

use veil_core::extract::StrategyKind;

pub(crate) fn strategy_label(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::Structural => "structural",
        StrategyKind::TokenBased => "token-based",
    }
}
