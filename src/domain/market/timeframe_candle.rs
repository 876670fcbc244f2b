use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use rust_decimal::Decimal;

/// An in-progress aggregation of 1-minute candles into a higher timeframe.
#[derive(Debug, Clone)]
pub struct TimeframeCandle {
    pub timeframe: Timeframe,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    candles_seen: u32,
}

impl TimeframeCandle {
    /// Starts a new aggregation period from its first constituent candle.
    /// `timestamp` is the period start, not the constituent's own timestamp.
    pub fn start(timeframe: Timeframe, timestamp: i64, first: &Candle) -> Self {
        Self {
            timeframe,
            timestamp,
            open: first.open,
            high: first.high,
            low: first.low,
            close: first.close,
            volume: first.volume,
            candles_seen: 1,
        }
    }

    /// Folds in the next constituent 1-minute candle.
    pub fn absorb(&mut self, candle: &Candle) {
        if candle.high > self.high {
            self.high = candle.high;
        }
        if candle.low < self.low {
            self.low = candle.low;
        }
        self.close = candle.close;
        self.volume += candle.volume;
        self.candles_seen += 1;
    }

    /// Whether this period has absorbed as many 1-minute candles as its
    /// timeframe spans.
    pub fn is_complete(&self) -> bool {
        self.candles_seen >= self.timeframe.to_minutes()
    }

    pub fn end_timestamp(&self) -> i64 {
        self.timestamp + self.timeframe.to_millis()
    }

    pub fn to_candle(&self) -> Candle {
        Candle {
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal, v: Decimal) -> Candle {
        Candle::new(ts, o, h, l, c, v).unwrap()
    }

    #[test]
    fn absorb_tracks_running_high_low_and_sums_volume() {
        let first = candle(0, dec!(100), dec!(105), dec!(99), dec!(103), dec!(10));
        let mut agg = TimeframeCandle::start(Timeframe::FIVE_MIN, 0, &first);

        agg.absorb(&candle(60_000, dec!(103), dec!(110), dec!(101), dec!(108), dec!(5)));
        agg.absorb(&candle(120_000, dec!(108), dec!(109), dec!(90), dec!(95), dec!(7)));

        assert_eq!(agg.open, dec!(100));
        assert_eq!(agg.high, dec!(110));
        assert_eq!(agg.low, dec!(90));
        assert_eq!(agg.close, dec!(95));
        assert_eq!(agg.volume, dec!(22));
    }

    #[test]
    fn is_complete_after_timeframe_minute_count() {
        let first = candle(0, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1));
        let mut agg = TimeframeCandle::start(Timeframe::FIVE_MIN, 0, &first);
        for i in 1..4 {
            assert!(!agg.is_complete());
            agg.absorb(&candle(
                i * 60_000,
                dec!(1),
                dec!(1),
                dec!(1),
                dec!(1),
                dec!(1),
            ));
        }
        assert!(!agg.is_complete());
        agg.absorb(&candle(4 * 60_000, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)));
        assert!(agg.is_complete());
    }

    #[test]
    fn end_timestamp_is_period_start_plus_span() {
        let first = candle(0, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1));
        let agg = TimeframeCandle::start(Timeframe::FIVE_MIN, 1_704_067_200_000, &first);
        assert_eq!(agg.end_timestamp(), 1_704_067_200_000 + 300_000);
    }
}
