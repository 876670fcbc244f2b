use crate::domain::market::candle::Candle;

/// Synthesizes a single higher-timeframe candle from a chronologically
/// ordered window of one-minute candles.
///
/// When `accept_forming` is false the caller must supply exactly
/// `expected_len` candles (a complete period); when true, a shorter
/// trailing window is accepted and the result represents the
/// still-open "forming" candle for the period so far.
pub fn generate(window: &[Candle], expected_len: usize, accept_forming: bool) -> Option<Candle> {
    if window.is_empty() {
        return None;
    }
    if !accept_forming && window.len() != expected_len {
        return None;
    }

    let open = window.first()?.open;
    let close = window.last()?.close;
    let high = window.iter().map(|c| c.high).max()?;
    let low = window.iter().map(|c| c.low).min()?;
    let volume = window.iter().map(|c| c.volume).sum();
    let timestamp = window.first()?.timestamp;

    Candle::new(timestamp, open, high, low, close, volume)
}

/// Repairs an overnight/data-gap jump between two adjacent candles: if
/// `next.open` does not match `prev.close`, `next.open` is rewritten to
/// `prev.close` and `next.high`/`next.low` are widened as needed to keep
/// the OHLC invariant intact. Symmetric in high/low: either bound may be
/// the one that needs widening, never both.
pub fn fix_jumped(prev: &Candle, next: &Candle) -> Candle {
    if next.open == prev.close {
        return *next;
    }

    let open = prev.close;
    let high = next.high.max(open);
    let low = next.low.min(open);

    Candle::new(next.timestamp, open, high, low, next.close, next.volume)
        .expect("widening high/low around the rewritten open preserves the OHLC invariant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, open: rust_decimal::Decimal, close: rust_decimal::Decimal, high: rust_decimal::Decimal, low: rust_decimal::Decimal, volume: rust_decimal::Decimal) -> Candle {
        Candle::new(ts, open, high, low, close, volume).unwrap()
    }

    #[test]
    fn generate_aggregates_one_minute_window_into_five_minute_candle() {
        let window = vec![
            candle(0, dec!(100), dec!(101), dec!(102), dec!(99), dec!(1)),
            candle(60_000, dec!(101), dec!(102), dec!(103), dec!(100), dec!(1)),
            candle(120_000, dec!(102), dec!(100), dec!(103), dec!(99), dec!(1)),
            candle(180_000, dec!(100), dec!(99), dec!(101), dec!(98), dec!(1)),
            candle(240_000, dec!(99), dec!(100), dec!(101), dec!(97), dec!(1)),
        ];

        let agg = generate(&window, 5, false).unwrap();
        assert_eq!(agg.timestamp, 0);
        assert_eq!(agg.open, dec!(100));
        assert_eq!(agg.close, dec!(100));
        assert_eq!(agg.high, dec!(103));
        assert_eq!(agg.low, dec!(97));
        assert_eq!(agg.volume, dec!(5));
    }

    #[test]
    fn generate_rejects_short_window_unless_forming_is_accepted() {
        let window = vec![candle(0, dec!(100), dec!(101), dec!(102), dec!(99), dec!(1))];
        assert!(generate(&window, 5, false).is_none());
        assert!(generate(&window, 5, true).is_some());
    }

    #[test]
    fn fix_jumped_rewrites_open_and_widens_low_when_gap_is_up() {
        let prev = candle(0, dec!(100), dec!(105), dec!(106), dec!(99), dec!(1));
        let next = candle(60_000, dec!(110), dec!(112), dec!(113), dec!(108), dec!(1));

        let fixed = fix_jumped(&prev, &next);

        assert_eq!(fixed.open, dec!(105));
        assert_eq!(fixed.high, dec!(113));
        assert_eq!(fixed.low, dec!(105));
        assert_eq!(fixed.close, dec!(112));
    }

    #[test]
    fn fix_jumped_is_a_no_op_when_already_continuous() {
        let prev = candle(0, dec!(100), dec!(105), dec!(106), dec!(99), dec!(1));
        let next = candle(60_000, dec!(105), dec!(106), dec!(107), dec!(104), dec!(1));

        let fixed = fix_jumped(&prev, &next);
        assert_eq!(fixed, next);
    }

    #[test]
    fn fix_jumped_is_idempotent() {
        let prev = candle(0, dec!(100), dec!(105), dec!(106), dec!(99), dec!(1));
        let next = candle(60_000, dec!(110), dec!(112), dec!(113), dec!(108), dec!(1));

        let once = fix_jumped(&prev, &next);
        let twice = fix_jumped(&prev, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn fix_jumped_rewrites_open_and_widens_high_when_gap_is_down() {
        let prev = candle(0, dec!(100), dec!(100), dec!(101), dec!(99), dec!(1));
        let next = candle(60_000, dec!(90), dec!(88), dec!(92), dec!(87), dec!(1));

        let fixed = fix_jumped(&prev, &next);

        assert_eq!(fixed.open, dec!(100));
        assert_eq!(fixed.high, dec!(100));
        assert_eq!(fixed.low, dec!(87));
    }
}
