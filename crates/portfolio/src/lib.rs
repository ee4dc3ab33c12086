//! Pure position and account mutation functions implementing the
//! LONG/SHORT/FLAT position transition table (`spec.md` §4.4).
//!
//! Deterministic, pure logic, no IO — mirrors `mqk-portfolio::accounting`'s
//! ledger-entry-in, mutated-state-out shape, adapted from FIFO lots to the
//! single VWAP lot per position `spec.md` actually models.

use rust_decimal::Decimal;
use tpd_schemas::{Direction, Side};

/// A `live_positions` row's mutable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub direction: Direction,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
}

impl PositionSnapshot {
    pub fn flat() -> Self {
        Self {
            direction: Direction::Flat,
            quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }
}

/// An `account_state` row's mutable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub free_cash: Decimal,
    pub used_margin: Decimal,
    pub equity: Decimal,
}

/// `Q > qty` on a closing side is not handled by the simple model
/// (`spec.md` §9). Resolved as reject-at-the-engine — see `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("partial reversal unsupported: fill qty {fill_qty} exceeds position qty {position_qty}")]
pub struct PartialReversalUnsupported {
    pub position_qty: Decimal,
    pub fill_qty: Decimal,
}

/// `fee = quantity * exec_price * FEE_RATE` (`spec.md` §4.4).
pub fn fee(quantity: Decimal, exec_price: Decimal, fee_rate: Decimal) -> Decimal {
    quantity * exec_price * fee_rate
}

/// Applies a fill to a position snapshot per the LONG/SHORT/FLAT transition
/// table. `quantity` is always positive.
pub fn apply_fill(
    position: &PositionSnapshot,
    side: Side,
    quantity: Decimal,
    exec_price: Decimal,
) -> Result<PositionSnapshot, PartialReversalUnsupported> {
    debug_assert!(quantity > Decimal::ZERO);

    match (position.direction, side) {
        (Direction::Flat, Side::Buy) => Ok(open(Direction::Long, quantity, exec_price)),
        (Direction::Flat, Side::Sell) => Ok(open(Direction::Short, quantity, exec_price)),
        (Direction::Long, Side::Buy) => Ok(average_up(position, quantity, exec_price)),
        (Direction::Short, Side::Sell) => Ok(average_up(position, quantity, exec_price)),
        (Direction::Long, Side::Sell) => {
            close_toward_flat(position, quantity, exec_price, |avg, exec| exec - avg)
        }
        (Direction::Short, Side::Buy) => {
            close_toward_flat(position, quantity, exec_price, |avg, exec| avg - exec)
        }
    }
}

fn open(direction: Direction, quantity: Decimal, exec_price: Decimal) -> PositionSnapshot {
    PositionSnapshot {
        direction,
        quantity,
        avg_price: exec_price,
        realized_pnl: Decimal::ZERO,
    }
}

/// LONG+BUY or SHORT+SELL: adds to the existing lot, re-averaging price.
fn average_up(
    position: &PositionSnapshot,
    quantity: Decimal,
    exec_price: Decimal,
) -> PositionSnapshot {
    let new_qty = position.quantity + quantity;
    let avg_price = (position.avg_price * position.quantity + exec_price * quantity) / new_qty;
    PositionSnapshot {
        direction: position.direction,
        quantity: new_qty,
        avg_price,
        realized_pnl: position.realized_pnl,
    }
}

/// LONG+SELL or SHORT+BUY: realizes PnL on `min(qty, Q)` and reduces the
/// position, going FLAT if fully closed. `pnl_per_unit` differs by side.
fn close_toward_flat(
    position: &PositionSnapshot,
    quantity: Decimal,
    exec_price: Decimal,
    pnl_per_unit: impl Fn(Decimal, Decimal) -> Decimal,
) -> Result<PositionSnapshot, PartialReversalUnsupported> {
    if quantity > position.quantity {
        return Err(PartialReversalUnsupported {
            position_qty: position.quantity,
            fill_qty: quantity,
        });
    }

    let realized_pnl =
        position.realized_pnl + pnl_per_unit(position.avg_price, exec_price) * quantity;
    let remaining = position.quantity - quantity;

    if remaining.is_zero() {
        Ok(PositionSnapshot {
            direction: Direction::Flat,
            quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            realized_pnl,
        })
    } else {
        Ok(PositionSnapshot {
            direction: position.direction,
            quantity: remaining,
            avg_price: position.avg_price,
            realized_pnl,
        })
    }
}

/// Applies a fill's cash impact to an account snapshot (`spec.md` §4.4,
/// "Cash accounting"). `used_margin` is left untouched by the simple model.
pub fn apply_cash(
    account: &AccountSnapshot,
    side: Side,
    quantity: Decimal,
    exec_price: Decimal,
    fee: Decimal,
) -> AccountSnapshot {
    let notional = exec_price * quantity;
    let free_cash = match side {
        Side::Buy => account.free_cash - notional - fee,
        Side::Sell => account.free_cash + notional - fee,
    };
    AccountSnapshot {
        free_cash,
        used_margin: account.used_margin,
        equity: free_cash + account.used_margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn flat_buy_opens_long() {
        let pos = apply_fill(&PositionSnapshot::flat(), Side::Buy, dec!(10), dec!(100)).unwrap();
        assert_eq!(
            pos,
            PositionSnapshot {
                direction: Direction::Long,
                quantity: dec!(10),
                avg_price: dec!(100),
                realized_pnl: Decimal::ZERO,
            }
        );
    }

    #[test]
    fn flat_sell_opens_short() {
        let pos = apply_fill(&PositionSnapshot::flat(), Side::Sell, dec!(10), dec!(100)).unwrap();
        assert_eq!(pos.direction, Direction::Short);
        assert_eq!(pos.quantity, dec!(10));
    }

    #[test]
    fn long_buy_averages_up() {
        let pos = PositionSnapshot {
            direction: Direction::Long,
            quantity: dec!(10),
            avg_price: dec!(100),
            realized_pnl: Decimal::ZERO,
        };
        let pos = apply_fill(&pos, Side::Buy, dec!(10), dec!(120)).unwrap();
        assert_eq!(pos.quantity, dec!(20));
        assert_eq!(pos.avg_price, dec!(110));
    }

    #[test]
    fn short_sell_averages_up() {
        let pos = PositionSnapshot {
            direction: Direction::Short,
            quantity: dec!(10),
            avg_price: dec!(100),
            realized_pnl: Decimal::ZERO,
        };
        let pos = apply_fill(&pos, Side::Sell, dec!(30), dec!(140)).unwrap();
        assert_eq!(pos.quantity, dec!(40));
        assert_eq!(pos.avg_price, dec!(130));
    }

    #[test]
    fn long_partial_sell_realizes_pnl_and_keeps_remainder() {
        let pos = PositionSnapshot {
            direction: Direction::Long,
            quantity: dec!(10),
            avg_price: dec!(100),
            realized_pnl: Decimal::ZERO,
        };
        let pos = apply_fill(&pos, Side::Sell, dec!(4), dec!(110)).unwrap();
        assert_eq!(pos.direction, Direction::Long);
        assert_eq!(pos.quantity, dec!(6));
        assert_eq!(pos.avg_price, dec!(100));
        assert_eq!(pos.realized_pnl, dec!(40));
    }

    #[test]
    fn long_full_sell_goes_flat() {
        let pos = PositionSnapshot {
            direction: Direction::Long,
            quantity: dec!(10),
            avg_price: dec!(100),
            realized_pnl: dec!(5),
        };
        let pos = apply_fill(&pos, Side::Sell, dec!(10), dec!(90)).unwrap();
        assert_eq!(pos.direction, Direction::Flat);
        assert_eq!(pos.quantity, Decimal::ZERO);
        assert_eq!(pos.avg_price, Decimal::ZERO);
        assert_eq!(pos.realized_pnl, dec!(5) + dec!(-10) * dec!(10));
    }

    #[test]
    fn short_buy_to_cover_realizes_pnl_on_reverse_sign() {
        let pos = PositionSnapshot {
            direction: Direction::Short,
            quantity: dec!(10),
            avg_price: dec!(100),
            realized_pnl: Decimal::ZERO,
        };
        let pos = apply_fill(&pos, Side::Buy, dec!(10), dec!(90)).unwrap();
        assert_eq!(pos.direction, Direction::Flat);
        assert_eq!(pos.realized_pnl, dec!(100));
    }

    #[test]
    fn flat_reopen_after_full_close() {
        let flat = PositionSnapshot::flat();
        let pos = apply_fill(&flat, Side::Sell, dec!(5), dec!(50)).unwrap();
        assert_eq!(pos.direction, Direction::Short);
        assert_eq!(pos.quantity, dec!(5));
    }

    #[test]
    fn partial_reversal_is_rejected_not_split() {
        let pos = PositionSnapshot {
            direction: Direction::Long,
            quantity: dec!(10),
            avg_price: dec!(100),
            realized_pnl: Decimal::ZERO,
        };
        let err = apply_fill(&pos, Side::Sell, dec!(15), dec!(90)).unwrap_err();
        assert_eq!(err.position_qty, dec!(10));
        assert_eq!(err.fill_qty, dec!(15));
    }

    #[test]
    fn fee_is_quantity_times_price_times_rate() {
        assert_eq!(fee(dec!(1000), dec!(101), dec!(0.0001)), dec!(10.1));
    }

    #[test]
    fn cash_accounting_buy_debits_notional_and_fee() {
        let account = AccountSnapshot {
            free_cash: dec!(100000),
            used_margin: dec!(0),
            equity: dec!(100000),
        };
        let out = apply_cash(&account, Side::Buy, dec!(1000), dec!(101), dec!(10.1));
        assert_eq!(out.free_cash, dec!(100000) - dec!(101000) - dec!(10.1));
        assert_eq!(out.equity, out.free_cash);
    }

    #[test]
    fn cash_accounting_sell_credits_notional_minus_fee() {
        let account = AccountSnapshot {
            free_cash: dec!(100000),
            used_margin: dec!(5000),
            equity: dec!(105000),
        };
        let out = apply_cash(&account, Side::Sell, dec!(10), dec!(90), dec!(0.09));
        assert_eq!(out.free_cash, dec!(100000) + dec!(900) - dec!(0.09));
        assert_eq!(out.used_margin, dec!(5000));
        assert_eq!(out.equity, out.free_cash + dec!(5000));
    }
}
