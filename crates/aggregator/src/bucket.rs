//! Pure bucket algebra: bucket bounds, the open-bucket state transition,
//! and gap detection (`spec.md` §4.1). No IO — grounded on
//! `original_source/demons/datafeed_aggregator copy.py`'s
//! `floor_timestamp_to_bucket`/`AggregatedBar.update_with_minute`/
//! `process_closed_bar` functions.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use rust_decimal::Decimal;
use tpd_schemas::{Bar, GapDir};

/// `[start, end)` bounds of the bucket containing minute timestamp `ts`
/// (`spec.md` §4.1, "Bucket algebra").
pub fn bucket_bounds(ts: DateTime<Utc>, width_minutes: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    if width_minutes >= 1440 {
        let start = Utc
            .with_ymd_and_hms(ts.year(), ts.month(), ts.day(), 0, 0, 0)
            .single()
            .expect("valid calendar date");
        (start, start + Duration::hours(24))
    } else {
        let minute_of_day = i64::from(ts.hour()) * 60 + i64::from(ts.minute());
        let bucket_start_minutes = (minute_of_day / width_minutes) * width_minutes;
        let start = Utc
            .with_ymd_and_hms(
                ts.year(),
                ts.month(),
                ts.day(),
                (bucket_start_minutes / 60) as u32,
                (bucket_start_minutes % 60) as u32,
                0,
            )
            .single()
            .expect("valid calendar time");
        (start, start + Duration::minutes(width_minutes))
    }
}

/// A bucket under construction for one `(timeframe, symbol_id)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenBucket {
    pub symbol_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl OpenBucket {
    fn open_at(start: DateTime<Utc>, end: DateTime<Utc>, minute: &Bar) -> Self {
        Self {
            symbol_id: minute.symbol_id,
            start,
            end,
            open: minute.open,
            high: minute.high,
            low: minute.low,
            close: minute.close,
            volume: minute.volume,
        }
    }

    fn update_with(&mut self, minute: &Bar) {
        self.high = self.high.max(minute.high);
        self.low = self.low.min(minute.low);
        self.close = minute.close;
        self.volume += minute.volume;
    }

    pub fn into_bar(self) -> Bar {
        Bar {
            symbol_id: self.symbol_id,
            ts: self.end,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Applies one minute to the open bucket for a `(timeframe, symbol_id)`
/// pair, returning the bucket that rolled over if `minute.ts` landed past
/// its end (`spec.md` §4.1, "Ingest loop"). `open` is `None` on first
/// contact with this key.
pub fn ingest_minute(
    open: &mut Option<OpenBucket>,
    minute: &Bar,
    width_minutes: i64,
) -> Option<OpenBucket> {
    let (start, end) = bucket_bounds(minute.ts, width_minutes);
    match open {
        None => {
            *open = Some(OpenBucket::open_at(start, end, minute));
            None
        }
        Some(bucket) => {
            if minute.ts >= bucket.end {
                let closed = *bucket;
                *open = Some(OpenBucket::open_at(start, end, minute));
                Some(closed)
            } else {
                bucket.update_with(minute);
                None
            }
        }
    }
}

/// `spec.md` §4.1, "Closing a bucket": relative change against the
/// previous closed bar's close, `None`/not-yet-seen and non-positive prior
/// closes never gap.
pub fn detect_gap(prev_close: Option<Decimal>, close: Decimal, threshold: Decimal) -> Option<GapDir> {
    let prev = prev_close.filter(|p| *p > Decimal::ZERO)?;
    let change = (close - prev).abs() / prev;
    if change >= threshold {
        Some(if close > prev { GapDir::Up } else { GapDir::Down })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn minute(symbol_id: i64, ts: DateTime<Utc>, close: Decimal) -> Bar {
        Bar {
            symbol_id,
            ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(10),
        }
    }

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn bucket_bounds_5m_floors_to_width() {
        let (start, end) = bucket_bounds(ts(10, 7), 5);
        assert_eq!(start, ts(10, 5));
        assert_eq!(end, ts(10, 10));
    }

    #[test]
    fn bucket_bounds_1d_is_utc_midnight() {
        let (start, end) = bucket_bounds(ts(23, 59), 1440);
        assert_eq!(start, ts(0, 0));
        assert_eq!(end, start + Duration::hours(24));
    }

    #[test]
    fn first_minute_opens_bucket_without_closing() {
        let mut open = None;
        let closed = ingest_minute(&mut open, &minute(1, ts(10, 1), dec!(100)), 5);
        assert!(closed.is_none());
        assert_eq!(open.unwrap().open, dec!(100));
    }

    #[test]
    fn minute_within_bucket_updates_high_low_close_volume() {
        let mut open = None;
        ingest_minute(&mut open, &minute(1, ts(10, 0), dec!(100)), 5);
        let closed = ingest_minute(&mut open, &minute(1, ts(10, 2), dec!(105)), 5);
        assert!(closed.is_none());
        let bucket = open.unwrap();
        assert_eq!(bucket.high, dec!(105));
        assert_eq!(bucket.close, dec!(105));
        assert_eq!(bucket.volume, dec!(20));
    }

    #[test]
    fn minute_past_end_closes_and_reopens() {
        let mut open = None;
        ingest_minute(&mut open, &minute(1, ts(10, 0), dec!(100)), 5);
        ingest_minute(&mut open, &minute(1, ts(10, 3), dec!(110)), 5);
        let closed = ingest_minute(&mut open, &minute(1, ts(10, 6), dec!(120)), 5)
            .expect("bucket must close on rollover");
        assert_eq!(closed.end, ts(10, 5));
        assert_eq!(closed.close, dec!(110));
        let reopened = open.unwrap();
        assert_eq!(reopened.start, ts(10, 5));
        assert_eq!(reopened.open, dec!(120));
    }

    #[test]
    fn gap_detection_thresholds_on_relative_change() {
        assert_eq!(detect_gap(Some(dec!(100)), dec!(119), dec!(0.2)), None);
        assert_eq!(
            detect_gap(Some(dec!(100)), dec!(121), dec!(0.2)),
            Some(GapDir::Up)
        );
        assert_eq!(
            detect_gap(Some(dec!(100)), dec!(79), dec!(0.2)),
            Some(GapDir::Down)
        );
        assert_eq!(detect_gap(None, dec!(100), dec!(0.2)), None);
        assert_eq!(detect_gap(Some(Decimal::ZERO), dec!(100), dec!(0.2)), None);
    }
}
