use std::fmt;

/// Bucket width for aggregated candles (`spec.md` §3 GLOSSARY, "Timeframe").
///
/// `M1` is the ingest timeframe (`candles_1m`); the rest are built by the
/// aggregator into `candles_<tf>`. Window width in minutes is fixed per
/// variant and drives the bucket algebra in `tpd-aggregator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TimeframeParseError> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(TimeframeParseError(other.to_string())),
        }
    }

    /// Bucket width in minutes, used by the bucket algebra (`spec.md` §4.1).
    pub fn width_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Name of the `candles_<tf>` table this timeframe's bars live in.
    pub fn candles_table(&self) -> &'static str {
        match self {
            Timeframe::M1 => "candles_1m",
            Timeframe::M5 => "candles_5m",
            Timeframe::M15 => "candles_15m",
            Timeframe::M30 => "candles_30m",
            Timeframe::H1 => "candles_1h",
            Timeframe::H4 => "candles_4h",
            Timeframe::D1 => "candles_1d",
        }
    }

    /// The timeframes the aggregator builds from `candles_1m` (everything but `M1` itself).
    pub fn aggregated() -> [Timeframe; 6] {
        [
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
        ]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeframeParseError(pub String);

impl fmt::Display for TimeframeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timeframe: {:?}", self.0)
    }
}

impl std::error::Error for TimeframeParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_variants() {
        for tf in [
            Timeframe::M1,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
        ] {
            assert_eq!(Timeframe::parse(tf.as_str()).unwrap(), tf);
        }
    }

    #[test]
    fn aggregated_excludes_m1() {
        assert!(!Timeframe::aggregated().contains(&Timeframe::M1));
        assert_eq!(Timeframe::aggregated().len(), 6);
    }

    #[test]
    fn rejects_unknown_timeframe() {
        assert!(Timeframe::parse("2h").is_err());
    }
}
