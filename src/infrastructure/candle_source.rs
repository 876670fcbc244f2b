use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::errors::ExchangeError;
use crate::domain::market::candle::Candle;
use crate::domain::ports::CandleSource;

/// One exchange's historical-candle HTTP endpoint, expressed as a plain
/// data shape so `HttpCandleSource` stays generic across drivers
/// (Binance, Bitmex, Bitstamp, Coinbase, Huobi, ...) the way spec §6
/// requires — only the URL template and response shape differ per
/// exchange, not the retry/pagination contract.
#[derive(Debug, Clone)]
pub struct ExchangeEndpoint {
    pub exchange: String,
    pub candles_url: String,
    pub listing_url: String,
    /// Maximum candles returned per `fetch` call; spec §6 puts this in
    /// the 500-10000 range depending on the driver.
    pub page_size: u32,
    /// A second exchange to chain to when this one lacks history for a
    /// symbol (spec §6 `backup_exchange_class`).
    pub backup: Option<Arc<dyn CandleSource>>,
}

/// Generic HTTP-backed [`CandleSource`]. Retries transient failures
/// (timeouts, 5xx) with exponential backoff via `reqwest-middleware` +
/// `reqwest-retry`, mirroring the teacher's pattern of wrapping a bare
/// `reqwest::Client` with connection-pool tuning
/// (`infrastructure/alpaca.rs::AlpacaMarketDataService::new`) — generalized
/// here to add the retry layer spec §7 requires for exchange drivers.
pub struct HttpCandleSource {
    client: reqwest_middleware::ClientWithMiddleware,
    endpoint: ExchangeEndpoint,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    #[serde(rename = "t")]
    timestamp: i64,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
}

impl HttpCandleSource {
    pub fn new(endpoint: ExchangeEndpoint) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self { client, endpoint }
    }

    fn classify(&self, status: Option<reqwest::StatusCode>, err: &str) -> ExchangeError {
        match status {
            Some(s) if s.as_u16() == 502 => ExchangeError::ExchangeInMaintenance {
                exchange: self.endpoint.exchange.clone(),
            },
            Some(s) if s.as_u16() == 429 => ExchangeError::RateLimitExceeded {
                exchange: self.endpoint.exchange.clone(),
                retry_after_secs: 60,
            },
            _ => {
                warn!(exchange = %self.endpoint.exchange, error = %err, "candle fetch failed");
                ExchangeError::Timeout {
                    exchange: self.endpoint.exchange.clone(),
                    duration_ms: 30_000,
                }
            }
        }
    }
}

#[async_trait]
impl CandleSource for HttpCandleSource {
    fn exchange(&self) -> &str {
        &self.endpoint.exchange
    }

    async fn get_starting_time(&self, symbol: &str) -> Result<i64, ExchangeError> {
        let response = self
            .client
            .get(&self.endpoint.listing_url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| self.classify(None, &e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.classify(Some(status), "non-success listing response"));
        }

        #[derive(Deserialize)]
        struct Listing {
            listed_at: i64,
        }
        let body: Listing = response
            .json()
            .await
            .map_err(|e| self.classify(None, &e.to_string()))?;
        Ok(body.listed_at)
    }

    async fn fetch(&self, symbol: &str, start: i64, count: u32) -> Result<Vec<Candle>, ExchangeError> {
        let page_size = count.min(self.endpoint.page_size);
        let response = self
            .client
            .get(&self.endpoint.candles_url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("start", start.to_string()),
                ("limit", page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.classify(None, &e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let classified = self.classify(Some(status), "non-success candle response");
            if let (ExchangeError::ExchangeInMaintenance { .. }, Some(backup)) =
                (&classified, &self.endpoint.backup)
            {
                debug!(exchange = %self.endpoint.exchange, "chaining to backup exchange");
                return backup.fetch(symbol, start, count).await;
            }
            return Err(classified);
        }

        let raw: Vec<RawCandle> = response
            .json()
            .await
            .map_err(|e| self.classify(None, &e.to_string()))?;

        if raw.is_empty() {
            return Ok(Vec::new());
        }

        Ok(raw
            .into_iter()
            .filter_map(|r| Candle::new(r.timestamp, r.open, r.high, r.low, r.close, r.volume))
            .collect())
    }
}

/// A deterministic, in-memory [`CandleSource`] used in tests and for the
/// `backtest`/`optimize` binaries' offline demo path, standing in for a
/// real exchange driver without any network I/O.
pub struct InMemoryCandleSource {
    exchange: String,
    candles: Vec<Candle>,
}

impl InMemoryCandleSource {
    pub fn new(exchange: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            exchange: exchange.into(),
            candles,
        }
    }
}

#[async_trait]
impl CandleSource for InMemoryCandleSource {
    fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn get_starting_time(&self, _symbol: &str) -> Result<i64, ExchangeError> {
        Ok(self.candles.first().map(|c| c.timestamp).unwrap_or(0))
    }

    async fn fetch(&self, _symbol: &str, start: i64, count: u32) -> Result<Vec<Candle>, ExchangeError> {
        Ok(self
            .candles
            .iter()
            .filter(|c| c.timestamp >= start)
            .take(count as usize)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64) -> Candle {
        Candle::new(ts, dec!(100), dec!(101), dec!(99), dec!(100), dec!(1)).unwrap()
    }

    #[tokio::test]
    async fn in_memory_source_paginates_by_count_from_start() {
        let source = InMemoryCandleSource::new(
            "mock",
            vec![candle(0), candle(60_000), candle(120_000), candle(180_000)],
        );

        let page = source.fetch("BTC-USDT", 60_000, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].timestamp, 60_000);
        assert_eq!(page[1].timestamp, 120_000);
    }

    #[tokio::test]
    async fn in_memory_source_returns_empty_past_the_end_of_history() {
        let source = InMemoryCandleSource::new("mock", vec![candle(0)]);
        let page = source.fetch("BTC-USDT", 1_000_000, 10).await.unwrap();
        assert!(page.is_empty());
    }
}
