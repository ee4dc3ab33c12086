use rust_decimal::Decimal;
use serde_json::Value;
use tpd_schemas::{Bar, Direction, OrderStatus, OrderType, Side, Timeframe};

/// An open (non-terminal) order, for strategies that want to avoid
/// duplicating an in-flight entry (`spec.md` §4.2, context field "open
/// orders for that (strategy_universe_id, symbol)").
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrderView {
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub status: OrderStatus,
}

/// The current position for `(strategy_universe_id, symbol, timeframe)`,
/// or `None` when flat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionView {
    pub direction: Direction,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
}

/// The three risk fractions carried on the `strategy_universe` row
/// (`spec.md` §4.2, context field "the three risk fractions").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskFractions {
    pub risk_per_trade: Decimal,
    pub max_drawdown_fraction: Decimal,
    pub gap_threshold_fraction: Option<Decimal>,
}

/// Everything `on_bar` needs, assembled once per `(symbol, tf, ts)` and
/// reused across every matched `strategy_universe` row for that bar
/// (`spec.md` §4.2, dispatch step 4). `history` is oldest-first and
/// excludes `bar`.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyContext {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bar: Bar,
    pub history: Vec<Bar>,
    pub position: Option<PositionView>,
    pub open_orders: Vec<OpenOrderView>,
    pub params: Value,
    pub risk: RiskFractions,
}

impl StrategyContext {
    /// Closing prices, oldest first, `history` followed by the current bar.
    pub fn closes(&self) -> Vec<Decimal> {
        let mut out: Vec<Decimal> = self.history.iter().map(|b| b.close).collect();
        out.push(self.bar.close);
        out
    }

    pub fn has_open_position(&self) -> bool {
        self.position
            .is_some_and(|p| p.direction != Direction::Flat && p.quantity > Decimal::ZERO)
    }
}
