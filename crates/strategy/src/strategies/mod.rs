mod atr_trail_trend;
mod sma_trend1;

pub use atr_trail_trend::AtrTrailTrend;
pub use sma_trend1::SmaTrend1;

use rust_decimal::Decimal;

use crate::StrategyContext;

pub(crate) fn param_decimal(ctx: &StrategyContext, key: &str, default: &str) -> Decimal {
    ctx.params
        .get(key)
        .and_then(|v| v.as_f64())
        .and_then(|f| Decimal::try_from(f).ok())
        .unwrap_or_else(|| default.parse().expect("default param literal must parse"))
}

pub(crate) fn param_usize(ctx: &StrategyContext, key: &str, default: usize) -> usize {
    ctx.params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

pub(crate) fn sma(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<Decimal>() / Decimal::from(period))
}
