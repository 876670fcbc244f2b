use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::market::candle::Candle;
use crate::domain::ports::Cache;

/// One-week TTL, matching spec §6's "simulator caches `(start, finish,
/// exchange, symbol) -> candle array` for one week".
const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    start: i64,
    finish: i64,
    exchange: String,
    symbol: String,
}

struct Entry {
    candles: Vec<Candle>,
    expires_at: Instant,
}

/// In-process TTL cache keyed exactly as spec §6 specifies. Stands in for
/// the Redis-backed cache spec §5 describes ("Historical candle cache
/// (Redis): read-mostly ... single-writer-per-key discipline via
/// idempotent put") without requiring a Redis dependency for a
/// single-process simulation session.
pub struct InMemoryCandleCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl InMemoryCandleCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCandleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCandleCache {
    async fn get(&self, start: i64, finish: i64, exchange: &str, symbol: &str) -> Option<Vec<Candle>> {
        let key = CacheKey {
            start,
            finish,
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
        };
        let entries = self.entries.read().expect("cache lock poisoned");
        entries.get(&key).filter(|e| e.expires_at > Instant::now()).map(|e| e.candles.clone())
    }

    async fn put(&self, start: i64, finish: i64, exchange: &str, symbol: &str, candles: Vec<Candle>) {
        let key = CacheKey {
            start,
            finish,
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
        };
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(
            key,
            Entry {
                candles,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64) -> Candle {
        Candle::new(ts, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_the_exact_key() {
        let cache = InMemoryCandleCache::new();
        cache.put(0, 100, "binance", "BTC-USDT", vec![candle(0), candle(1)]).await;

        let hit = cache.get(0, 100, "binance", "BTC-USDT").await;
        assert_eq!(hit.unwrap().len(), 2);

        assert!(cache.get(0, 100, "binance", "ETH-USDT").await.is_none());
        assert!(cache.get(0, 200, "binance", "BTC-USDT").await.is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let cache = InMemoryCandleCache::with_ttl(Duration::from_millis(10));
        cache.put(0, 100, "binance", "BTC-USDT", vec![candle(0)]).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(0, 100, "binance", "BTC-USDT").await.is_none());
    }
}
