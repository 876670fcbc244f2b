use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::domain::errors::DataError;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::CandleRepository;

/// SQLite-backed [`CandleRepository`], mirroring the teacher's
/// `SqliteCandleRepository` (`infrastructure/persistence/repositories.rs`):
/// decimal columns stored as text to avoid float round-tripping, an
/// `INSERT OR IGNORE` upsert keyed on the full `(exchange, symbol,
/// timeframe, timestamp)` tuple per spec §6's uniqueness constraint.
pub struct SqliteCandleRepository {
    pool: SqlitePool,
}

impl SqliteCandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the `candles` table if it does not already exist. Callers
    /// invoke this once at startup; the crate does not ship migrations
    /// since schema evolution is outside this component's scope.
    pub async fn migrate(&self) -> Result<(), DataError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                timeframe_minutes INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (exchange, symbol, timeframe_minutes, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "candle table migration failed");
            DataError::CandleNotFoundInDatabase {
                exchange: "*".into(),
                symbol: "*".into(),
                timeframe: "*".into(),
                start: 0,
                finish: 0,
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    async fn save(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), DataError> {
        for candle in candles {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO candles
                    (exchange, symbol, timeframe_minutes, timestamp, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(exchange)
            .bind(symbol)
            .bind(timeframe.to_minutes())
            .bind(candle.timestamp)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .execute(&self.pool)
            .await
            .map_err(|_| DataError::CandleNotFoundInDatabase {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                start: candle.timestamp,
                finish: candle.timestamp,
            })?;
        }

        info!(exchange, symbol, %timeframe, count = candles.len(), "persisted candles");
        Ok(())
    }

    async fn load_range(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        start: i64,
        finish: i64,
    ) -> Result<Vec<Candle>, DataError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, open, high, low, close, volume FROM candles
            WHERE exchange = ? AND symbol = ? AND timeframe_minutes = ?
              AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(exchange)
        .bind(symbol)
        .bind(timeframe.to_minutes())
        .bind(start)
        .bind(finish)
        .fetch_all(&self.pool)
        .await
        .map_err(|_| DataError::CandleNotFoundInDatabase {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            start,
            finish,
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let decode = |col: &str| -> Result<Decimal, DataError> {
                let raw: String = row.try_get(col).map_err(|_| DataError::CandleNotFoundInDatabase {
                    exchange: exchange.to_string(),
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                    start,
                    finish,
                })?;
                Decimal::from_str(&raw).map_err(|_| DataError::CandleNotFoundInDatabase {
                    exchange: exchange.to_string(),
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                    start,
                    finish,
                })
            };

            let timestamp: i64 = row.try_get("timestamp").map_err(|_| DataError::CandleNotFoundInDatabase {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                start,
                finish,
            })?;

            if let Some(candle) = Candle::new(
                timestamp,
                decode("open")?,
                decode("high")?,
                decode("low")?,
                decode("close")?,
                decode("volume")?,
            ) {
                candles.push(candle);
            }
        }

        if candles.is_empty() {
            return Err(DataError::CandleNotFoundInDatabase {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                start,
                finish,
            });
        }

        Ok(candles)
    }
}
