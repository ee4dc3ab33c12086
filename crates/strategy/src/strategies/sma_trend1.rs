use rust_decimal::Decimal;
use tpd_schemas::{Direction, OrderType, SignalPayload, SignalType, SizeMode};

use super::{param_decimal, param_usize, sma};
use crate::{Strategy, StrategyContext};

/// Long-only SMA crossover: opens on a fast-over-slow cross, closes on the
/// reverse cross. Translated in spirit from `sma_trend1_live.py` — the
/// fixed-percentage stop/take-profit and "no entry while a long or open
/// order exists" gate are unchanged, sizing is left to the execution
/// engine.
#[derive(Debug, Default)]
pub struct SmaTrend1;

impl Strategy for SmaTrend1 {
    fn name(&self) -> &'static str {
        "sma_trend1_live"
    }

    fn on_bar(&mut self, ctx: &StrategyContext) -> Option<SignalPayload> {
        let fast_period = param_usize(ctx, "fast_period", 20);
        let slow_period = param_usize(ctx, "slow_period", 100);
        let sl_pct = param_decimal(ctx, "sl_pct", "2.0");
        let tp_pct = param_decimal(ctx, "tp_pct", "4.0");

        let closes = ctx.closes();
        if closes.len() < 2 {
            return None;
        }
        let prev = &closes[..closes.len() - 1];

        let fast_prev = sma(prev, fast_period)?;
        let slow_prev = sma(prev, slow_period)?;
        let fast_cur = sma(&closes, fast_period)?;
        let slow_cur = sma(&closes, slow_period)?;

        let price = ctx.bar.close;
        let has_long = ctx.has_open_position()
            && ctx.position.map(|p| p.direction) == Some(Direction::Long);

        if has_long && fast_prev > slow_prev && fast_cur <= slow_cur {
            return Some(SignalPayload {
                signal_type: SignalType::Close,
                direction: None,
                entry_type: OrderType::Market,
                entry_price: None,
                stop_loss: None,
                take_profit: None,
                size_mode: None,
                size_value: None,
                comment: Some("sma_trend1_live: close on fast<slow".into()),
            });
        }

        if has_long || !ctx.open_orders.is_empty() {
            return None;
        }

        if fast_prev < slow_prev && fast_cur >= slow_cur {
            let hundred = Decimal::from(100);
            let stop_loss = price * (Decimal::ONE - sl_pct / hundred);
            let take_profit = price * (Decimal::ONE + tp_pct / hundred);
            return Some(SignalPayload {
                signal_type: SignalType::Open,
                direction: Some(Direction::Long),
                entry_type: OrderType::Market,
                entry_price: Some(price),
                stop_loss: Some(stop_loss),
                take_profit: Some(take_profit),
                size_mode: Some(SizeMode::RiskFraction),
                size_value: Some(Decimal::ONE),
                comment: Some("sma_trend1_live: open long on fast>slow".into()),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tpd_schemas::Bar;

    fn bar(symbol_id: i64, close: Decimal) -> Bar {
        Bar {
            symbol_id,
            ts: Utc.timestamp_opt(0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
        }
    }

    fn ctx_with_closes(closes: &[i64]) -> StrategyContext {
        let history: Vec<Bar> = closes[..closes.len() - 1]
            .iter()
            .map(|c| bar(1, Decimal::from(*c)))
            .collect();
        let current = bar(1, Decimal::from(*closes.last().unwrap()));
        StrategyContext {
            symbol: "AAA".into(),
            timeframe: tpd_schemas::Timeframe::M1,
            bar: current,
            history,
            position: None,
            open_orders: Vec::new(),
            params: json!({}),
            risk: crate::RiskFractions {
                risk_per_trade: dec!(0.02),
                max_drawdown_fraction: dec!(0.2),
                gap_threshold_fraction: None,
            },
        }
    }

    #[test]
    fn no_signal_with_insufficient_history() {
        let ctx = ctx_with_closes(&[100, 101]);
        assert_eq!(SmaTrend1.on_bar(&ctx), None);
    }

    #[test]
    fn opens_long_on_upward_cross() {
        // 99 bars flat at 90 (fast == slow), then a jump to 200 pulls the
        // fast SMA above the still-low slow SMA.
        let mut closes = vec![90i64; 99];
        closes.push(200);
        let ctx = ctx_with_closes(&closes);
        let signal = SmaTrend1.on_bar(&ctx).expect("expected an OPEN signal");
        assert_eq!(signal.signal_type, SignalType::Open);
        assert_eq!(signal.direction, Some(Direction::Long));
        assert_eq!(signal.entry_price, Some(dec!(200)));
    }

    #[test]
    fn no_entry_while_long_open() {
        let mut closes = vec![90i64; 99];
        closes.push(200);
        let mut ctx = ctx_with_closes(&closes);
        ctx.position = Some(crate::PositionView {
            direction: Direction::Long,
            quantity: dec!(10),
            avg_price: dec!(90),
            realized_pnl: Decimal::ZERO,
        });
        // fast <= slow on this bar (flat history), so no CLOSE either.
        assert_eq!(SmaTrend1.on_bar(&ctx), None);
    }
}
