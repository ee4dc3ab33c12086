//! Pure signal-to-order conversion logic: admission checks and the sizing
//! formula (`spec.md` §4.3). No IO, no time — every function here is a
//! deterministic mapping from inputs to a decision, mirroring `mqk-risk`'s
//! "deterministic, pure logic, no IO, no broker calls" design.

mod admission;
mod sizing;

pub use admission::{check_admission, AdmissionContext};
pub use sizing::{derive_side, size_entry, SizingInput, SizingOutcome};

/// Closed set of rejection reasons, serialized into `live_errors.details_json`
/// and used verbatim as the `message` field (`spec.md` §4.3's scattered
/// string literals, made a Rust-native enum the way `mqk-risk::ReasonCode`
/// is a closed enum rather than a `String`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("missing_strategy_universe")]
    MissingStrategyUniverse,
    #[error("trading_disabled_by_control")]
    TradingDisabledByControl,
    #[error("new_positions_disabled_by_control")]
    NewPositionsDisabledByControl,
    #[error("max_total_positions_exceeded")]
    MaxTotalPositionsExceeded,
    #[error("max_positions_per_strategy_exceeded")]
    MaxPositionsPerStrategyExceeded,
    #[error("unsupported_size_mode")]
    UnsupportedSizeMode,
    #[error("invalid_risk_span")]
    InvalidRiskSpan,
    #[error("too_wide_stop")]
    TooWideStop,
    #[error("size_too_small")]
    SizeTooSmall,
    #[error("insufficient_cash")]
    InsufficientCash,
    #[error("invalid_direction_for_open")]
    InvalidDirectionForOpen,
}

impl RejectReason {
    /// Stable string form stored in `live_errors.details_json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingStrategyUniverse => "missing_strategy_universe",
            RejectReason::TradingDisabledByControl => "trading_disabled_by_control",
            RejectReason::NewPositionsDisabledByControl => "new_positions_disabled_by_control",
            RejectReason::MaxTotalPositionsExceeded => "max_total_positions_exceeded",
            RejectReason::MaxPositionsPerStrategyExceeded => "max_positions_per_strategy_exceeded",
            RejectReason::UnsupportedSizeMode => "unsupported_size_mode",
            RejectReason::InvalidRiskSpan => "invalid_risk_span",
            RejectReason::TooWideStop => "too_wide_stop",
            RejectReason::SizeTooSmall => "size_too_small",
            RejectReason::InsufficientCash => "insufficient_cash",
            RejectReason::InvalidDirectionForOpen => "invalid_direction_for_open",
        }
    }
}
