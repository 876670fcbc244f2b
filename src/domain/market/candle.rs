use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar, always one minute wide at the source-of-truth
/// level; higher timeframes are built from these by [`super::timeframe_candle::TimeframeCandle`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Builds a candle, rejecting OHLC values that violate `low <= open,
    /// close <= high` and `low <= high`.
    pub fn new(
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Option<Self> {
        if low > high || open < low || open > high || close < low || close > high {
            return None;
        }
        Some(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_inverted_high_low() {
        assert!(Candle::new(0, dec!(10), dec!(5), dec!(9), dec!(10), dec!(1)).is_none());
    }

    #[test]
    fn rejects_open_outside_range() {
        assert!(Candle::new(0, dec!(20), dec!(15), dec!(9), dec!(10), dec!(1)).is_none());
    }

    #[test]
    fn accepts_consistent_candle() {
        let candle = Candle::new(0, dec!(10), dec!(12), dec!(9), dec!(11), dec!(5)).unwrap();
        assert_eq!(candle.close, dec!(11));
    }
}
