//! Shared domain types for the trading pipeline.
//!
//! This crate has no database dependency: it defines the enums and wire
//! types that every daemon and the `store` crate agree on, so that a
//! `Timeframe` or `Side` parsed from a Postgres row and one built by a
//! strategy plug-in are the same Rust type. Enums round-trip to Postgres
//! `TEXT` columns through `as_str()`/`parse()` pairs rather than a derive
//! macro, the way `mqk-db::RunStatus` does it.

mod timeframe;

pub use timeframe::{Timeframe, TimeframeParseError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        type_name: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Raised when a Postgres `TEXT` column holds a value no known enum variant maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub type_name: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.type_name, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

text_enum! {
    /// Net exposure direction for a `live_positions` row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Direction {
        Long => "LONG",
        Short => "SHORT",
        Flat => "FLAT",
    }
}

text_enum! {
    /// Order side, derived from a signal's direction or from a close transition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Side {
        Buy => "BUY",
        Sell => "SELL",
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OrderType {
        Market => "MARKET",
        Limit => "LIMIT",
        Stop => "STOP",
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OrderStatus {
        New => "NEW",
        Filled => "FILLED",
        Rejected => "REJECTED",
        PartiallyFilled => "PARTIALLY_FILLED",
    }
}

impl OrderStatus {
    /// Terminal statuses never revert (`spec.md` §3, live order invariants).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Rejected)
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SignalType {
        Open => "OPEN",
        Add => "ADD",
        Reverse => "REVERSE",
        Close => "CLOSE",
        ManualClose => "MANUAL_CLOSE",
        ForcedClose => "FORCED_CLOSE",
    }
}

impl SignalType {
    /// Close-family signals are allowed through even when `allow_trading=false`
    /// (`spec.md` §4.3, admission check 2).
    pub fn is_close_family(&self) -> bool {
        matches!(self, SignalType::ManualClose | SignalType::ForcedClose)
    }

    /// Close signals (all three) resolve against the existing position rather
    /// than sizing a new one (`spec.md` §4.3, "Close signals").
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            SignalType::Close | SignalType::ManualClose | SignalType::ForcedClose
        )
    }

    /// Entry-family signals are subject to `allow_new_positions` and position
    /// count limits (`spec.md` §4.3, admission checks 3-4).
    pub fn is_entry_family(&self) -> bool {
        matches!(self, SignalType::Open | SignalType::Add | SignalType::Reverse)
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SizeMode {
        RiskFraction => "RISK_FRACTION",
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GapDir {
        Up => "UP",
        Down => "DOWN",
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ErrorSource {
        DataFeed => "data_feed",
        Strategy => "strategy",
        StrategyRunner => "strategy_runner",
        Execution => "execution",
        Risk => "risk",
        Broker => "broker",
        System => "system",
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub enum ErrorSeverity {
        Info => "info",
        Warning => "warning",
        Error => "error",
        Critical => "critical",
    }
}

text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StrategyMode {
        Paper => "paper",
        Live => "live",
    }
}

/// One closed OHLCV bar, the in-memory shape returned by `store` queries
/// against `candles_1m` / `candles_<tf>` (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub symbol_id: i64,
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// The `live_signals.signal_json` wire format (`spec.md` §6).
///
/// `type` is the only required field; the rest are only meaningful for
/// entry-family signals. Deserialization is lenient about unknown fields so
/// a strategy plug-in's extra `comment` or future fields do not break
/// dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    #[serde(rename = "type", with = "signal_type_serde")]
    pub signal_type: SignalType,
    #[serde(default, with = "opt_direction_serde")]
    pub direction: Option<Direction>,
    #[serde(default = "default_entry_type", with = "order_type_serde")]
    pub entry_type: OrderType,
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    #[serde(default, with = "opt_size_mode_serde")]
    pub size_mode: Option<SizeMode>,
    pub size_value: Option<Decimal>,
    pub comment: Option<String>,
}

fn default_entry_type() -> OrderType {
    OrderType::Market
}

macro_rules! text_enum_serde_mod {
    ($mod_name:ident, $ty:ty) => {
        mod $mod_name {
            use super::*;

            pub fn serialize<S>(value: &$ty, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(value.as_str())
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<$ty, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$ty>::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

text_enum_serde_mod!(signal_type_serde, SignalType);
text_enum_serde_mod!(order_type_serde, OrderType);

mod opt_direction_serde {
    use super::*;

    pub fn serialize<S>(value: &Option<Direction>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(d.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Direction>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => Direction::parse(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

mod opt_size_mode_serde {
    use super::*;

    pub fn serialize<S>(value: &Option<SizeMode>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(d.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SizeMode>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => SizeMode::parse(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trips() {
        for d in [Direction::Long, Direction::Short, Direction::Flat] {
            assert_eq!(Direction::parse(d.as_str()).unwrap(), d);
        }
    }

    #[test]
    fn parse_unknown_variant_errors() {
        let err = Side::parse("SIDEWAYS").unwrap_err();
        assert_eq!(err.type_name, "Side");
    }

    #[test]
    fn signal_payload_round_trips_through_json() {
        let payload = SignalPayload {
            signal_type: SignalType::Open,
            direction: Some(Direction::Long),
            entry_type: OrderType::Market,
            entry_price: Some(Decimal::new(10100, 2)),
            stop_loss: Some(Decimal::new(9900, 2)),
            take_profit: None,
            size_mode: Some(SizeMode::RiskFraction),
            size_value: Some(Decimal::ONE),
            comment: Some("breakout".to_string()),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"OPEN\""));
        let back: SignalPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.signal_type, payload.signal_type);
        assert_eq!(back.direction, payload.direction);
        assert_eq!(back.entry_price, payload.entry_price);
    }

    #[test]
    fn signal_payload_defaults_entry_type_to_market() {
        let json = r#"{"type":"CLOSE"}"#;
        let payload: SignalPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.entry_type, OrderType::Market);
        assert!(payload.direction.is_none());
    }
}
