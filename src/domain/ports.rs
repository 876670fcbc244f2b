use crate::domain::errors::{DataError, ExchangeError};
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use async_trait::async_trait;

/// A driver for one exchange's historical-candle HTTP API.
#[async_trait]
pub trait CandleSource: Send + Sync {
    fn exchange(&self) -> &str;

    /// Earliest timestamp this exchange has data for `symbol`, used to
    /// clamp a requested start date.
    async fn get_starting_time(&self, symbol: &str) -> Result<i64, ExchangeError>;

    /// Fetches up to `count` 1-minute candles for `symbol` starting at
    /// `start` (inclusive). Returns fewer than `count` only at the end of
    /// available history.
    async fn fetch(&self, symbol: &str, start: i64, count: u32) -> Result<Vec<Candle>, ExchangeError>;
}

/// Persistent storage for candles, keyed by `(exchange, symbol,
/// timeframe, timestamp)` with uniqueness on that full key.
#[async_trait]
pub trait CandleRepository: Send + Sync {
    async fn save(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), DataError>;

    async fn load_range(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        start: i64,
        finish: i64,
    ) -> Result<Vec<Candle>, DataError>;
}

/// A one-week TTL cache for candle-array query results, keyed exactly as
/// they are requested: `(start, finish, exchange, symbol)`.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, start: i64, finish: i64, exchange: &str, symbol: &str) -> Option<Vec<Candle>>;
    async fn put(&self, start: i64, finish: i64, exchange: &str, symbol: &str, candles: Vec<Candle>);
}

/// A durable work queue handing DNA candidates to optimization workers.
/// The in-process `crossbeam_channel` implementation in
/// `infrastructure::broker` stands in for an out-of-process broker
/// (e.g. Redis-backed) without changing how the coordinator dispatches
/// work.
pub trait TaskBroker<T: Send + 'static>: Send + Sync {
    fn dispatch(&self, task: T);
    /// Blocks until a task is available or the broker is closed.
    fn next(&self) -> Option<T>;
}
