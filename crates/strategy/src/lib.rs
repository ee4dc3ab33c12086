//! Strategy plug-in contract and catalogue (`spec.md` §4.2, "Plug-in
//! contract"). A strategy is a pure function of `StrategyContext` producing
//! at most one [`SignalPayload`] — no IO, no broker/DB access, matching
//! `mqk-strategy::Strategy`'s `on_bar`-only Tier A contract.

mod context;
mod registry;
pub mod strategies;

pub use context::{OpenOrderView, PositionView, RiskFractions, StrategyContext};
pub use registry::{builtin_registry, PluginRegistry, RegistryError, StrategyFactory};

use tpd_schemas::SignalPayload;

/// A strategy plug-in. Implementations must be deterministic given their
/// context and must not retain mutable state beyond what `on_bar`'s
/// parameters already carry, so replay from the same history is
/// reproducible.
pub trait Strategy: Send + Sync {
    /// Unique registry key, matching `strategy_catalog.live_py_class` (or
    /// `py_class` as fallback).
    fn name(&self) -> &'static str;

    /// Returns a signal to persist to `live_signals`, or `None` if the
    /// strategy has nothing to say about this bar (`spec.md` §4.2, dispatch
    /// step 6 — a `None` return is not an error).
    fn on_bar(&mut self, ctx: &StrategyContext) -> Option<SignalPayload>;
}
