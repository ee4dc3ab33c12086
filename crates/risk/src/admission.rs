use crate::RejectReason;
use tpd_schemas::SignalType;

/// Everything the ordered admission-check chain needs, gathered by the
/// caller from `trading_control`, `live_positions` counts, and the
/// `strategy_universe` row (`spec.md` §4.3, "Admission checks").
#[derive(Debug, Clone, Copy)]
pub struct AdmissionContext {
    pub allow_trading: bool,
    pub allow_new_positions: bool,
    pub total_open_positions: i64,
    pub open_positions_for_strategy: i64,
    pub max_total_positions: i64,
    pub max_positions_per_strategy: i64,
}

/// Runs admission checks 2-4 in order (`spec.md` §4.3). Check 1 (resolving
/// the `strategy_universe` row) happens before a context can even be built,
/// so it is the caller's responsibility and surfaces as
/// [`RejectReason::MissingStrategyUniverse`] directly.
pub fn check_admission(
    ctx: &AdmissionContext,
    signal_type: SignalType,
) -> Result<(), RejectReason> {
    if !ctx.allow_trading && !signal_type.is_close_family() {
        return Err(RejectReason::TradingDisabledByControl);
    }

    if signal_type.is_entry_family() {
        if !ctx.allow_new_positions {
            return Err(RejectReason::NewPositionsDisabledByControl);
        }
        if ctx.total_open_positions >= ctx.max_total_positions {
            return Err(RejectReason::MaxTotalPositionsExceeded);
        }
        if ctx.open_positions_for_strategy >= ctx.max_positions_per_strategy {
            return Err(RejectReason::MaxPositionsPerStrategyExceeded);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> AdmissionContext {
        AdmissionContext {
            allow_trading: true,
            allow_new_positions: true,
            total_open_positions: 0,
            open_positions_for_strategy: 0,
            max_total_positions: 10,
            max_positions_per_strategy: 5,
        }
    }

    #[test]
    fn trading_disabled_rejects_open_but_not_close() {
        let ctx = AdmissionContext {
            allow_trading: false,
            ..base_ctx()
        };
        assert_eq!(
            check_admission(&ctx, SignalType::Open),
            Err(RejectReason::TradingDisabledByControl)
        );
        assert_eq!(check_admission(&ctx, SignalType::ManualClose), Ok(()));
        assert_eq!(check_admission(&ctx, SignalType::ForcedClose), Ok(()));
    }

    #[test]
    fn new_positions_disabled_blocks_entries_only() {
        let ctx = AdmissionContext {
            allow_new_positions: false,
            ..base_ctx()
        };
        assert_eq!(
            check_admission(&ctx, SignalType::Add),
            Err(RejectReason::NewPositionsDisabledByControl)
        );
        assert_eq!(check_admission(&ctx, SignalType::Close), Ok(()));
    }

    #[test]
    fn position_caps_enforced_for_entries() {
        let ctx = AdmissionContext {
            total_open_positions: 10,
            ..base_ctx()
        };
        assert_eq!(
            check_admission(&ctx, SignalType::Open),
            Err(RejectReason::MaxTotalPositionsExceeded)
        );

        let ctx = AdmissionContext {
            open_positions_for_strategy: 5,
            ..base_ctx()
        };
        assert_eq!(
            check_admission(&ctx, SignalType::Reverse),
            Err(RejectReason::MaxPositionsPerStrategyExceeded)
        );
    }
}
