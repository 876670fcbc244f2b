use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use std::collections::{HashMap, VecDeque};

/// Default number of candles retained per key before the oldest is
/// evicted to bound memory.
pub const DEFAULT_CAPACITY: usize = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoreKey {
    exchange: String,
    symbol: String,
    timeframe_minutes: u32,
}

/// In-memory candle cache keyed by `(exchange, symbol, timeframe)`, with a
/// bounded ring buffer per key. Insertion is idempotent by timestamp: a
/// candle that repeats an existing timestamp overwrites it in place
/// instead of appending a duplicate.
pub struct CandleStore {
    capacity: usize,
    buffers: HashMap<StoreKey, VecDeque<Candle>>,
}

impl CandleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: HashMap::new(),
        }
    }

    fn key(exchange: &str, symbol: &str, timeframe: Timeframe) -> StoreKey {
        StoreKey {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe_minutes: timeframe.to_minutes(),
        }
    }

    /// Inserts or overwrites a candle for the given key. Candles must be
    /// appended in non-decreasing timestamp order except for the final
    /// (in-progress) candle, which may be repeatedly overwritten.
    pub fn add(&mut self, exchange: &str, symbol: &str, timeframe: Timeframe, candle: Candle) {
        let buf = self
            .buffers
            .entry(Self::key(exchange, symbol, timeframe))
            .or_default();

        match buf.back_mut() {
            Some(last) if last.timestamp == candle.timestamp => {
                *last = candle;
            }
            _ => {
                buf.push_back(candle);
                if buf.len() > self.capacity {
                    buf.pop_front();
                }
            }
        }
    }

    /// The most recent candle for a key, if any.
    pub fn current(&self, exchange: &str, symbol: &str, timeframe: Timeframe) -> Option<&Candle> {
        self.buffers
            .get(&Self::key(exchange, symbol, timeframe))
            .and_then(|b| b.back())
    }

    /// All candles currently retained for a key, oldest first.
    pub fn get_range(&self, exchange: &str, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        self.buffers
            .get(&Self::key(exchange, symbol, timeframe))
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, exchange: &str, symbol: &str, timeframe: Timeframe) -> usize {
        self.buffers
            .get(&Self::key(exchange, symbol, timeframe))
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, exchange: &str, symbol: &str, timeframe: Timeframe) -> bool {
        self.len(exchange, symbol, timeframe) == 0
    }
}

impl Default for CandleStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: rust_decimal::Decimal) -> Candle {
        Candle::new(ts, close, close, close, close, dec!(1)).unwrap()
    }

    #[test]
    fn add_appends_and_overwrites_by_timestamp() {
        let mut store = CandleStore::new(10);
        store.add("binance", "BTC-USDT", Timeframe::ONE_MIN, candle(0, dec!(100)));
        store.add("binance", "BTC-USDT", Timeframe::ONE_MIN, candle(0, dec!(101)));
        store.add("binance", "BTC-USDT", Timeframe::ONE_MIN, candle(60_000, dec!(102)));

        assert_eq!(store.len("binance", "BTC-USDT", Timeframe::ONE_MIN), 2);
        assert_eq!(
            store
                .current("binance", "BTC-USDT", Timeframe::ONE_MIN)
                .unwrap()
                .close,
            dec!(102)
        );
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut store = CandleStore::new(3);
        for i in 0..5 {
            store.add(
                "binance",
                "BTC-USDT",
                Timeframe::ONE_MIN,
                candle(i * 60_000, dec!(1)),
            );
        }
        let range = store.get_range("binance", "BTC-USDT", Timeframe::ONE_MIN);
        assert_eq!(range.len(), 3);
        assert_eq!(range.first().unwrap().timestamp, 2 * 60_000);
        assert_eq!(range.last().unwrap().timestamp, 4 * 60_000);
    }

    #[test]
    fn keys_are_independent_per_exchange_symbol_timeframe() {
        let mut store = CandleStore::new(10);
        store.add("binance", "BTC-USDT", Timeframe::ONE_MIN, candle(0, dec!(1)));
        store.add("binance", "ETH-USDT", Timeframe::ONE_MIN, candle(0, dec!(2)));
        store.add("binance", "BTC-USDT", Timeframe::FIVE_MIN, candle(0, dec!(3)));

        assert_eq!(store.len("binance", "BTC-USDT", Timeframe::ONE_MIN), 1);
        assert_eq!(store.len("binance", "ETH-USDT", Timeframe::ONE_MIN), 1);
        assert_eq!(store.len("binance", "BTC-USDT", Timeframe::FIVE_MIN), 1);
        assert!(store.is_empty("binance", "ETH-USDT", Timeframe::FIVE_MIN));
    }
}
